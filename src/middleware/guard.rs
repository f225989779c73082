//! Replay guard and challenge issuance
//!
//! [`PaymentGuard::admit`] decides what happens to one incoming request:
//!
//! 1. No proof headers: a fresh [`Challenge`] is issued. The store is not touched.
//! 2. Proof for an already consumed reference: rejected with
//!    [`X402Error::ReplayDetected`] before the verifier is consulted.
//! 3. Otherwise the verifier is asked (or, in trust mode, skipped). A negative
//!    verdict or an unreachable verifier rejects the request and leaves the
//!    reference unconsumed, so the payer can retry with a valid proof.
//! 4. The reference is consumed atomically. Losing that race to a concurrent
//!    request with the same reference is a replay.
//!
//! The guard is framework-agnostic; see [`payment_middleware`](super::payment_middleware)
//! and [`PaymentGuardLayer`](super::PaymentGuardLayer) for the axum integration.

use super::config::PaymentGuardConfig;
use crate::facilitator::PaymentVerifier;
use crate::reference_store::{InMemoryReferenceStore, ReferenceStore};
use crate::types::{PaymentInfo, PaymentProof, PaymentRequirement, VerifyRequest};
use crate::{Result, X402Error};
use chrono::Utc;
use http::HeaderMap;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use std::sync::Arc;

const REFERENCE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const REFERENCE_SUFFIX_LEN: usize = 12;

const INSTRUCTIONS: &str = "Send payment to the recipient address and retry with \
    X-402-Payment-Signature and X-402-Payment-Reference headers";

type PaymentCallback = Arc<dyn Fn(&PaymentInfo) + Send + Sync>;
type FailureCallback = Arc<dyn Fn(&X402Error) + Send + Sync>;

/// Generate a fresh payment reference
///
/// References look like `pay_<hex unix seconds><12 random [a-z0-9]>`.
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("pay_{:x}{}", Utc::now().timestamp(), suffix)
}

/// Verified payment attached to an admitted request, if any
pub fn payment_info<B>(request: &http::Request<B>) -> Option<&PaymentInfo> {
    request.extensions().get::<PaymentInfo>()
}

/// Outcome of [`PaymentGuard::admit`]
#[derive(Debug)]
pub enum Admission {
    /// Forward the request; the payment has been verified and consumed
    Admitted(PaymentInfo),
    /// Answer with a 402 challenge
    Challenge(Challenge),
    /// Refuse the request
    Rejected(X402Error),
}

/// A freshly issued 402 challenge
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub requirement: PaymentRequirement,
    pub memo: Option<String>,
}

impl Challenge {
    /// JSON body of the 402 response
    pub fn body(&self) -> Value {
        let requirement = &self.requirement;
        json!({
            "error": "Payment Required",
            "code": "PAYMENT_REQUIRED",
            "payment": {
                "amount": requirement.amount.to_f64(),
                "currency": requirement.currency,
                "recipient": requirement.recipient,
                "reference": requirement.reference,
                "expires": requirement.expires,
                "memo": self.memo,
            },
            "instructions": INSTRUCTIONS,
        })
    }

    /// Challenge headers mirroring the body
    pub fn headers(&self) -> Result<HeaderMap> {
        self.requirement.to_headers()
    }
}

/// Server-side replay guard
#[derive(Clone)]
pub struct PaymentGuard {
    config: Arc<PaymentGuardConfig>,
    verifier: Option<Arc<dyn PaymentVerifier>>,
    store: Arc<dyn ReferenceStore>,
    on_payment_received: Option<PaymentCallback>,
    on_payment_failed: Option<FailureCallback>,
}

impl std::fmt::Debug for PaymentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGuard")
            .field("config", &self.config)
            .field("verify_payments", &self.verifier.is_some())
            .finish()
    }
}

impl PaymentGuard {
    /// Create a guard that verifies every proof with `verifier`
    pub fn new(config: PaymentGuardConfig, verifier: impl PaymentVerifier + 'static) -> Self {
        Self {
            verifier: Some(Arc::new(verifier)),
            ..Self::trusting(config)
        }
    }

    /// Create a guard that admits any well-formed proof without verification
    ///
    /// Replay protection still applies.
    pub fn trusting(config: PaymentGuardConfig) -> Self {
        Self {
            config: Arc::new(config),
            verifier: None,
            store: Arc::new(InMemoryReferenceStore::new()),
            on_payment_received: None,
            on_payment_failed: None,
        }
    }

    /// Use `store` to track consumed references
    pub fn with_store(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        self.store = store;
        self
    }

    /// Call `callback` for every admitted payment
    pub fn on_payment_received(
        mut self,
        callback: impl Fn(&PaymentInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_received = Some(Arc::new(callback));
        self
    }

    /// Call `callback` when verification fails or cannot be performed
    pub fn on_payment_failed(
        mut self,
        callback: impl Fn(&X402Error) + Send + Sync + 'static,
    ) -> Self {
        self.on_payment_failed = Some(Arc::new(callback));
        self
    }

    /// Get the guard configuration
    pub fn config(&self) -> &PaymentGuardConfig {
        &self.config
    }

    /// Whether proofs are checked with a verifier
    pub fn verifies_payments(&self) -> bool {
        self.verifier.is_some()
    }

    /// Issue a fresh challenge
    pub fn challenge(&self) -> Challenge {
        Challenge {
            requirement: self.config.requirement(generate_reference(), Utc::now()),
            memo: self.config.memo.clone(),
        }
    }

    /// Decide what to do with a request carrying `headers`
    pub async fn admit(&self, headers: &HeaderMap) -> Admission {
        let Some(proof) = PaymentProof::from_headers(headers) else {
            let challenge = self.challenge();
            tracing::debug!(
                "Issuing challenge {} for {} {}",
                challenge.requirement.reference,
                challenge.requirement.amount,
                challenge.requirement.currency
            );
            return Admission::Challenge(challenge);
        };

        match self.admit_proof(proof).await {
            Ok(info) => Admission::Admitted(info),
            Err(err) => Admission::Rejected(err),
        }
    }

    async fn admit_proof(&self, proof: PaymentProof) -> Result<PaymentInfo> {
        let consumed = self
            .store
            .is_consumed(&proof.reference)
            .await
            .map_err(|e| self.fail(store_failure(e)))?;
        if consumed {
            tracing::warn!("Rejected replay of reference {}", proof.reference);
            return Err(X402Error::ReplayDetected {
                reference: proof.reference,
            });
        }

        let info = match &self.verifier {
            Some(verifier) => self.verify(verifier.as_ref(), &proof).await?,
            None => PaymentInfo {
                signature: proof.signature.clone(),
                reference: proof.reference.clone(),
                amount: self.config.amount,
                currency: self.config.currency,
                sender: None,
                verified_at: Utc::now(),
            },
        };

        let won = self
            .store
            .try_consume(&proof.reference)
            .await
            .map_err(|e| self.fail(store_failure(e)))?;
        if !won {
            tracing::warn!("Reference {} was consumed concurrently", proof.reference);
            return Err(X402Error::ReplayDetected {
                reference: proof.reference,
            });
        }

        tracing::info!(
            "Admitted payment {} of {} {} for {}",
            info.signature,
            info.amount,
            info.currency,
            info.reference
        );
        if let Some(callback) = &self.on_payment_received {
            callback(&info);
        }
        Ok(info)
    }

    async fn verify(
        &self,
        verifier: &dyn PaymentVerifier,
        proof: &PaymentProof,
    ) -> Result<PaymentInfo> {
        let request = VerifyRequest {
            signature: proof.signature.clone(),
            reference: proof.reference.clone(),
            expected_amount: self.config.amount,
            expected_recipient: self.config.recipient.clone(),
        };

        let response = verifier
            .verify(&request)
            .await
            .map_err(|e| self.fail(X402Error::verification_error(e.to_string())))?;

        if !response.verified {
            return Err(self.fail(X402Error::VerificationFailed {
                reference: proof.reference.clone(),
            }));
        }

        let transaction = response.transaction;
        Ok(PaymentInfo {
            signature: proof.signature.clone(),
            reference: proof.reference.clone(),
            amount: transaction.amount,
            currency: transaction.currency,
            sender: Some(transaction.sender),
            verified_at: Utc::now(),
        })
    }

    fn fail(&self, err: X402Error) -> X402Error {
        tracing::warn!("Payment rejected: {}", err);
        if let Some(callback) = &self.on_payment_failed {
            callback(&err);
        }
        err
    }
}

// The store cannot say whether the reference is spent, so nothing is admitted.
fn store_failure(err: X402Error) -> X402Error {
    X402Error::verification_error(format!("reference store unavailable: {}", err))
}
