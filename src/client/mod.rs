//! HTTP client with automatic 402 payment handling
//!
//! [`X402Client::execute`] sends a request and, when the server answers with a
//! payment challenge, validates the challenge against the payment policy, pays it
//! through the configured [`PaymentExecutor`] and retries once with the proof
//! attached.
//!
//! # Retry policy
//!
//! Only the initial send is retried:
//! - generic transport failures retry up to `retry_attempts` times, waiting
//!   `retry_delay * attempt` between tries
//! - a 429 waits exactly the server's `Retry-After` and tries again while
//!   attempts remain
//! - timeouts are never retried
//! - nothing is retried once a payment has been made
//!
//! # Examples
//!
//! ```no_run
//! use x402_sdk::client::{ClientConfig, RequestOptions, X402Client};
//! use x402_sdk::executor::PaymentExecutor;
//! use x402_sdk::types::PaymentRequirement;
//! use x402_sdk::BoxError;
//!
//! struct Wallet;
//!
//! #[async_trait::async_trait]
//! impl PaymentExecutor for Wallet {
//!     async fn execute(&self, requirement: &PaymentRequirement) -> Result<String, BoxError> {
//!         Ok(format!("sig-for-{}", requirement.reference))
//!     }
//! }
//!
//! # async fn example() -> x402_sdk::Result<()> {
//! let client = X402Client::new(ClientConfig::new().with_api_key("key"))?.with_executor(Wallet);
//! let response = client
//!     .execute("https://api.example.com/premium", RequestOptions::get())
//!     .await?;
//!
//! if let Some(payment) = &response.payment_made {
//!     println!("paid {} {}", payment.amount, payment.currency);
//! }
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;

#[cfg(test)]
mod tests;

pub use classifier::{classify_response, classify_with_default_code};
pub use config::ClientConfig;

use crate::executor::PaymentExecutor;
use crate::types::{
    headers, PaymentMade, PaymentProof, PaymentRequirement, X402Response, SDK_VERSION,
};
use crate::{Result, X402Error};
use chrono::Utc;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Per-call request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method
    pub method: Method,
    /// Extra request headers
    pub headers: HeaderMap,
    /// JSON body
    pub body: Option<Value>,
    /// Overrides the client timeout for each send of this call
    pub timeout: Option<Duration>,
    /// Overrides the client-wide payment ceiling for this call
    pub max_payment: Option<Decimal>,
    /// Pay challenges automatically; when false a 402 is returned as an error
    pub auto_sign: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            max_payment: None,
            auto_sign: true,
        }
    }
}

impl RequestOptions {
    /// Options for a GET request
    pub fn get() -> Self {
        Self::default()
    }

    /// Options for a POST request with a JSON body
    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Set the HTTP method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: http::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the per-send timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the payment ceiling
    pub fn with_max_payment(mut self, max_payment: Decimal) -> Self {
        self.max_payment = Some(max_payment);
        self
    }

    /// Enable or disable automatic payment of challenges
    pub fn with_auto_sign(mut self, auto_sign: bool) -> Self {
        self.auto_sign = auto_sign;
        self
    }
}

/// Attempt bookkeeping for one `execute` call
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<X402Error>,
}

impl RetryState {
    // Only transport failures and rate limits are recorded, so the last error
    // is already the right thing to surface.
    fn exhausted(self) -> X402Error {
        self.last_error
            .unwrap_or_else(|| X402Error::network("Max retry attempts exceeded"))
    }
}

/// Client for resources protected by 402 challenges
#[derive(Clone)]
pub struct X402Client {
    config: Arc<ClientConfig>,
    http: Client,
    executor: Option<Arc<dyn PaymentExecutor>>,
}

impl std::fmt::Debug for X402Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("base_url", &self.config.base_url)
            .field("network", &self.config.network)
            .field("executor", &self.executor.as_ref().map(|_| "<executor>"))
            .finish()
    }
}

impl X402Client {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            headers::SDK_VERSION,
            HeaderValue::from_static(SDK_VERSION),
        );
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| X402Error::config("api_key", "not a valid header value"))?;
            default_headers.insert(http::header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .build()
            .map_err(|e| X402Error::config("http_client", format!("failed to build: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            http,
            executor: None,
        })
    }

    /// Set the executor used to pay challenges
    pub fn with_executor(mut self, executor: impl PaymentExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a GET request, paying a challenge if one is returned
    pub async fn get(&self, url: &str) -> Result<X402Response> {
        self.execute(url, RequestOptions::get()).await
    }

    /// Send a POST request with a JSON body, paying a challenge if one is returned
    pub async fn post(&self, url: &str, body: Value) -> Result<X402Response> {
        self.execute(url, RequestOptions::post(body)).await
    }

    /// Send a request and drive the challenge/payment/retry handshake
    pub async fn execute(&self, url: &str, options: RequestOptions) -> Result<X402Response> {
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let mut state = RetryState::default();

        while state.attempt < self.config.retry_attempts {
            state.attempt += 1;
            tracing::debug!("{} {} (attempt {})", options.method, url, state.attempt);

            let sent = self
                .send(url, &options, options.headers.clone(), timeout)
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(err) if err.is_timeout() => {
                    tracing::warn!("Request to {} timed out after {:?}", url, timeout);
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!("Attempt {} to {} failed: {}", state.attempt, url, err);
                    state.last_error = Some(err);
                    if state.attempt < self.config.retry_attempts {
                        tokio::time::sleep(self.config.retry_delay * state.attempt).await;
                    }
                    continue;
                }
            };

            if response.status == StatusCode::PAYMENT_REQUIRED && options.auto_sign {
                return self.pay_and_retry(url, &options, timeout, response).await;
            }

            if !response.status.is_success() {
                let err = classify_response(response.status, &response.headers, &response.body);
                let rate_limited = match &err {
                    X402Error::RateLimited { retry_after, .. } => Some(*retry_after),
                    _ => None,
                };
                if let Some(retry_after) = rate_limited {
                    tracing::warn!("Rate limited by {}, retrying after {}s", url, retry_after);
                    state.last_error = Some(err);
                    if state.attempt < self.config.retry_attempts {
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    }
                    continue;
                }
                return Err(err);
            }

            return Ok(response.into_outcome(None));
        }

        Err(state.exhausted())
    }

    async fn pay_and_retry(
        &self,
        url: &str,
        options: &RequestOptions,
        timeout: Duration,
        challenge: RawResponse,
    ) -> Result<X402Response> {
        let requirement = PaymentRequirement::from_headers(&challenge.headers)?;
        let limit = options
            .max_payment
            .unwrap_or(self.config.max_payment_per_request);

        if requirement.amount > limit {
            return Err(X402Error::MaxPaymentExceeded {
                requested: requirement.amount,
                limit,
            });
        }

        if requirement.is_expired_at(Utc::now()) {
            return Err(X402Error::PaymentExpired {
                reference: requirement.reference.clone(),
                expired_at: requirement.expires_at(),
            });
        }

        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| X402Error::config("executor", "no payment executor configured"))?;

        if let Some(network) = &requirement.network {
            if network != self.config.network.as_str() {
                tracing::warn!(
                    "Challenge {} names network {}, client is configured for {}",
                    requirement.reference,
                    network,
                    self.config.network
                );
            }
        }

        tracing::info!(
            "Paying {} {} to {} for {}",
            requirement.amount,
            requirement.currency,
            requirement.recipient,
            requirement.reference
        );
        let signature = executor
            .execute(&requirement)
            .await
            .map_err(X402Error::Executor)?;
        let proof = PaymentProof::new(signature, requirement.reference.clone());
        let mut paid_headers = options.headers.clone();
        proof.apply(&mut paid_headers)?;

        // The paid retry is sent exactly once. A second challenge here is a
        // rejection of the proof, not a new payment cycle.
        let response = self.send(url, options, paid_headers, timeout).await?;
        if !response.status.is_success() {
            let default_code = if response.status == StatusCode::PAYMENT_REQUIRED {
                "PAYMENT_REJECTED"
            } else {
                classifier::DEFAULT_API_CODE
            };
            let err = classify_with_default_code(
                response.status,
                &response.headers,
                &response.body,
                default_code,
            );
            tracing::warn!("Paid retry for {} was rejected: {}", requirement.reference, err);
            return Err(err);
        }

        Ok(response.into_outcome(Some(PaymentMade {
            amount: requirement.amount,
            currency: requirement.currency,
            signature: proof.signature,
        })))
    }

    async fn send(
        &self,
        url: &str,
        options: &RequestOptions,
        request_headers: HeaderMap,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let mut request = self
            .http
            .request(options.method.clone(), url)
            .headers(request_headers)
            .timeout(timeout);
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Fully buffered response
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl RawResponse {
    fn into_outcome(self, payment_made: Option<PaymentMade>) -> X402Response {
        let data = if self.body.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(serde_json::from_slice(&self.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&self.body).into_owned())
            }))
        };

        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        X402Response {
            data,
            status: self.status.as_u16(),
            headers,
            payment_made,
        }
    }
}
