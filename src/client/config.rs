//! Client configuration

use crate::types::{defaults, Network};
use crate::{Result, X402Error};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for [`X402Client`](super::X402Client)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key sent as a bearer token
    pub api_key: Option<String>,
    /// Base URL of the x402 API
    pub base_url: String,
    /// Network payments are expected on
    pub network: Network,
    /// Client-wide payment ceiling per request
    pub max_payment_per_request: Decimal,
    /// Timeout applied to each individual send
    pub timeout: Duration,
    /// Attempts for the initial send of a request
    pub retry_attempts: u32,
    /// Base delay between transport retries; attempt `n` waits `n * retry_delay`
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: defaults::BASE_URL.to_string(),
            network: Network::default(),
            max_payment_per_request: Decimal::from_str(defaults::MAX_PAYMENT_PER_REQUEST)
                .unwrap_or(Decimal::ZERO),
            timeout: defaults::TIMEOUT,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_delay: defaults::RETRY_DELAY,
        }
    }
}

impl ClientConfig {
    /// Create a new client config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the network
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the client-wide payment ceiling
    pub fn with_max_payment(mut self, max_payment: Decimal) -> Self {
        self.max_payment_per_request = max_payment;
        self
    }

    /// Set the per-send timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of attempts for the initial send
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Set the base retry delay
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Load configuration from `X402_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a key lookup, falling back to defaults for absent keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(api_key) = lookup("X402_API_KEY") {
            config = config.with_api_key(api_key);
        }
        if let Some(base_url) = lookup("X402_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Some(network) = lookup("X402_NETWORK") {
            config.network = network.parse()?;
        }
        if let Some(max_payment) = lookup("X402_MAX_PAYMENT") {
            config.max_payment_per_request = Decimal::from_str(&max_payment).map_err(|_| {
                X402Error::config("max_payment_per_request", "must be a decimal amount")
            })?;
        }
        if let Some(timeout) = lookup("X402_TIMEOUT_SECS") {
            let secs = timeout
                .parse()
                .map_err(|_| X402Error::config("timeout", "must be a number of seconds"))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = lookup("X402_RETRY_ATTEMPTS") {
            config.retry_attempts = attempts
                .parse()
                .map_err(|_| X402Error::config("retry_attempts", "must be an integer"))?;
        }
        if let Some(delay) = lookup("X402_RETRY_DELAY_MS") {
            let millis = delay
                .parse()
                .map_err(|_| X402Error::config("retry_delay", "must be a number of milliseconds"))?;
            config.retry_delay = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the client configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| X402Error::config("base_url", format!("invalid URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(X402Error::config(
                "base_url",
                "must start with http:// or https://",
            ));
        }

        if self.max_payment_per_request <= Decimal::ZERO {
            return Err(X402Error::config(
                "max_payment_per_request",
                "must be greater than zero",
            ));
        }

        if self.retry_attempts == 0 {
            return Err(X402Error::config("retry_attempts", "must be at least 1"));
        }

        if self.timeout.is_zero() {
            return Err(X402Error::config("timeout", "must be greater than zero"));
        }

        Ok(())
    }
}
