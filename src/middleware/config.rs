//! Guard configuration

use crate::types::{defaults, Currency, Network, PaymentRequirement};
use crate::{Result, X402Error};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Price and payee of a protected resource
#[derive(Debug, Clone)]
pub struct PaymentGuardConfig {
    /// Amount charged per request
    pub amount: Decimal,
    /// Currency the amount is denominated in
    pub currency: Currency,
    /// Address payments must be sent to
    pub recipient: String,
    /// How long an issued challenge stays payable
    pub expires_in: Duration,
    /// Free-form memo included in the challenge body
    pub memo: Option<String>,
    /// Network advertised in the challenge headers
    pub network: Option<Network>,
}

impl PaymentGuardConfig {
    /// Create a new guard config charging `amount` of the native currency
    pub fn new(amount: Decimal, recipient: impl Into<String>) -> Self {
        Self {
            amount,
            currency: Currency::default(),
            recipient: recipient.into(),
            expires_in: defaults::CHALLENGE_EXPIRES_IN,
            memo: None,
            network: None,
        }
    }

    /// Set the currency
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Set the challenge validity window
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = expires_in;
        self
    }

    /// Set the memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Advertise a network in issued challenges
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Load configuration from a key lookup
    ///
    /// `X402_AMOUNT` and `X402_RECIPIENT` are required; `X402_CURRENCY`,
    /// `X402_EXPIRES_IN` (seconds), `X402_MEMO` and `X402_NETWORK` are optional.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let amount = lookup("X402_AMOUNT")
            .ok_or_else(|| X402Error::config("amount", "X402_AMOUNT is not set"))?;
        let amount = Decimal::from_str(amount.trim())
            .map_err(|_| X402Error::config("amount", "must be a decimal amount"))?;
        let recipient = lookup("X402_RECIPIENT")
            .ok_or_else(|| X402Error::config("recipient", "X402_RECIPIENT is not set"))?;

        let mut config = Self::new(amount, recipient);

        if let Some(currency) = lookup("X402_CURRENCY") {
            config.currency = currency
                .parse()
                .map_err(|_| X402Error::config("currency", "must be SOL or USDC"))?;
        }
        if let Some(expires_in) = lookup("X402_EXPIRES_IN") {
            let secs = expires_in
                .parse()
                .map_err(|_| X402Error::config("expires_in", "must be a number of seconds"))?;
            config.expires_in = Duration::from_secs(secs);
        }
        if let Some(memo) = lookup("X402_MEMO") {
            config.memo = Some(memo);
        }
        if let Some(network) = lookup("X402_NETWORK") {
            config.network = Some(network.parse()?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `X402_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Validate the guard configuration
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(X402Error::config("amount", "must be greater than zero"));
        }
        if self.recipient.trim().is_empty() {
            return Err(X402Error::config("recipient", "must not be empty"));
        }
        if self.expires_in.is_zero() {
            return Err(X402Error::config("expires_in", "must be greater than zero"));
        }
        if i64::try_from(self.expires_in.as_secs()).is_err() {
            return Err(X402Error::config("expires_in", "is too large"));
        }
        Ok(())
    }

    /// Requirement for a fresh challenge issued at `now`
    ///
    /// The expiry saturates at `i64::MAX` rather than overflowing.
    pub fn requirement(
        &self,
        reference: impl Into<String>,
        now: DateTime<Utc>,
    ) -> PaymentRequirement {
        let window = i64::try_from(self.expires_in.as_secs()).unwrap_or(i64::MAX);
        PaymentRequirement {
            amount: self.amount,
            currency: self.currency,
            recipient: self.recipient.clone(),
            reference: reference.into(),
            expires: now.timestamp().saturating_add(window),
            network: self.network.map(|n| n.as_str().to_string()),
        }
    }
}
