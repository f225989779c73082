//! Verification service request and response types

use super::payment::{Currency, PaymentRequirement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to verify a payment proof against the expected terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Signature presented by the payer
    pub signature: String,
    /// Reference the signature claims to pay
    pub reference: String,
    /// Amount the protected resource costs
    #[serde(with = "rust_decimal::serde::float")]
    pub expected_amount: Decimal,
    /// Address that must have received the payment
    pub expected_recipient: String,
}

/// On-ledger details of a verified payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub signature: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub sender: String,
    pub recipient: String,
    pub confirmed_at: String,
    pub slot: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
}

/// Verification verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the proof satisfies the expected terms
    pub verified: bool,
    /// Transaction the proof refers to
    pub transaction: TransactionDetails,
}

/// Request to have the service issue a challenge on the caller's behalf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: Currency,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// Validity window in seconds
    pub expires_in: u64,
}

impl PaymentRequest {
    /// Create a new payment request with the default ten minute window
    pub fn new(amount: Decimal, recipient: impl Into<String>) -> Self {
        Self {
            amount,
            currency: Currency::Native,
            recipient: recipient.into(),
            memo: None,
            expires_in: super::constants::defaults::CHALLENGE_EXPIRES_IN.as_secs(),
        }
    }

    /// Set the currency
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    /// Set the memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Set the validity window in seconds
    pub fn with_expires_in(mut self, expires_in: u64) -> Self {
        self.expires_in = expires_in;
        self
    }
}

/// Challenge issued by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub reference: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub recipient: String,
    pub expires: i64,
    /// Challenge headers to mirror on a 402 response
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl PaymentResponse {
    /// The issued challenge as a requirement
    pub fn requirement(&self) -> PaymentRequirement {
        PaymentRequirement {
            amount: self.amount,
            currency: self.currency,
            recipient: self.recipient.clone(),
            reference: self.reference.clone(),
            expires: self.expires,
            network: None,
        }
    }
}
