//! Payment verification
//!
//! The server guard never inspects a ledger itself. It asks a
//! [`PaymentVerifier`] whether a presented proof pays the expected amount to the
//! expected recipient. [`FacilitatorClient`] is the verifier backed by the x402
//! HTTP verification service; it also exposes the service's challenge issuance
//! endpoint.
//!
//! # Examples
//!
//! ```no_run
//! use x402_sdk::client::ClientConfig;
//! use x402_sdk::facilitator::FacilitatorClient;
//! use x402_sdk::types::VerifyRequest;
//! use rust_decimal::Decimal;
//!
//! # async fn example() -> x402_sdk::Result<()> {
//! let facilitator = FacilitatorClient::new(ClientConfig::new().with_api_key("key"))?;
//!
//! let verdict = facilitator
//!     .verify(&VerifyRequest {
//!         signature: "5Kx...".to_string(),
//!         reference: "pay_abc".to_string(),
//!         expected_amount: Decimal::new(5, 2),
//!         expected_recipient: "R1".to_string(),
//!     })
//!     .await?;
//!
//! if verdict.verified {
//!     println!("paid by {}", verdict.transaction.sender);
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::{ClientConfig, RequestOptions, X402Client};
use crate::error::BoxError;
use crate::types::{PaymentRequest, PaymentResponse, VerifyRequest, VerifyResponse};
use crate::{Result, X402Error};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;


/// Decides whether a payment proof satisfies the expected terms
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Verify a payment proof
    ///
    /// `Ok` with `verified: false` is a negative verdict; `Err` means the
    /// verifier could not be consulted.
    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> std::result::Result<VerifyResponse, BoxError>;
}

#[async_trait]
impl<T: PaymentVerifier + ?Sized> PaymentVerifier for Arc<T> {
    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> std::result::Result<VerifyResponse, BoxError> {
        (**self).verify(request).await
    }
}

/// Client for the x402 verification service
#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    client: X402Client,
}

impl FacilitatorClient {
    /// Create a new facilitator client
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            client: X402Client::new(config)?,
        })
    }

    /// Create a facilitator client from an existing engine
    pub fn from_client(client: X402Client) -> Self {
        Self { client }
    }

    /// Base URL of the service
    pub fn url(&self) -> &str {
        &self.client.config().base_url
    }

    /// Verify a payment proof
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse> {
        tracing::debug!(
            "Verifying payment {} for reference {}",
            request.signature,
            request.reference
        );
        let response: VerifyResponse = self.post("/verify", request).await?;
        if !response.verified {
            tracing::warn!(
                "Verification service rejected payment for {}",
                request.reference
            );
        }
        Ok(response)
    }

    /// Ask the service to issue a challenge
    pub async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentResponse> {
        tracing::debug!(
            "Requesting challenge for {} {} to {}",
            request.amount,
            request.currency,
            request.recipient
        );
        self.post("/payment-request", request).await
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}/api{}", self.url(), endpoint);
        let body = serde_json::to_value(body).map_err(|e| X402Error::Api {
            message: format!("Failed to encode request: {}", e),
            code: "INVALID_REQUEST".to_string(),
            status: None,
            details: serde_json::Value::Null,
        })?;

        // Service calls are never paid
        let options = RequestOptions::post(body).with_auto_sign(false);
        let response = self.client.execute(&url, options).await?;
        response.json()
    }
}

#[async_trait]
impl PaymentVerifier for FacilitatorClient {
    async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> std::result::Result<VerifyResponse, BoxError> {
        FacilitatorClient::verify(self, request)
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }
}
