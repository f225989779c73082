//! Payment-related types
//!
//! [`PaymentRequirement`] is both parsed from and encoded to the mirrored
//! `X-402-*` challenge headers, so the client engine and the server guard share
//! a single definition of the wire format.

use super::constants::{headers, PROTOCOL_VERSION};
use crate::{Result, X402Error};
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Asset a payment is denominated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Currency {
    /// The chain's native asset
    #[default]
    #[serde(rename = "SOL")]
    Native,
    /// A USD stablecoin
    #[serde(rename = "USDC")]
    Stable,
}

impl Currency {
    /// Ticker used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Native => "SOL",
            Currency::Stable => "USDC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = X402Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("SOL") {
            Ok(Currency::Native)
        } else if s.eq_ignore_ascii_case("USDC") {
            Ok(Currency::Stable)
        } else {
            Err(X402Error::invalid_challenge(format!(
                "unsupported currency '{}'",
                s
            )))
        }
    }
}

/// Validated terms of a 402 challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequirement {
    /// Amount to pay, in whole currency units
    pub amount: Decimal,
    /// Asset to pay in
    pub currency: Currency,
    /// Address receiving the payment
    pub recipient: String,
    /// Single-use reference binding the payment to this challenge
    pub reference: String,
    /// Absolute expiry, unix seconds
    pub expires: i64,
    /// Chain identifier, when the server names one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl PaymentRequirement {
    /// Parse a requirement from challenge response headers
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        Self::parse(|name| headers.get(name).and_then(|v| v.to_str().ok()))
    }

    /// Parse a requirement from plain key/value fields, matching keys case-insensitively
    pub fn from_map(fields: &HashMap<String, String>) -> Result<Self> {
        Self::parse(|name| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        })
    }

    // All required fields are checked before anything is returned: a challenge
    // with any missing or malformed field is rejected as a whole.
    fn parse<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Result<Self> {
        let field = |name: &str| lookup(name).map(str::trim).filter(|v| !v.is_empty());

        let amount = match field(headers::AMOUNT) {
            Some(raw) => Decimal::from_str(raw).map_err(|_| {
                X402Error::invalid_challenge(format!("amount '{}' is not a decimal", raw))
            })?,
            None => Decimal::ZERO,
        };

        let currency = match field(headers::CURRENCY) {
            Some(raw) => raw.parse()?,
            None => Currency::Native,
        };

        // No expiry means "already expired": the server must state one explicitly.
        let expires = match field(headers::EXPIRES) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                X402Error::invalid_challenge(format!("expires '{}' is not a unix timestamp", raw))
            })?,
            None => 0,
        };

        let recipient = field(headers::RECIPIENT);
        let reference = field(headers::REFERENCE);

        match (recipient, reference) {
            (Some(recipient), Some(reference)) if amount > Decimal::ZERO => Ok(Self {
                amount,
                currency,
                recipient: recipient.to_string(),
                reference: reference.to_string(),
                expires,
                network: field(headers::NETWORK).map(str::to_string),
            }),
            _ => Err(X402Error::invalid_challenge("missing required headers")),
        }
    }

    /// Encode the requirement as challenge headers
    pub fn to_headers(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        insert_header(&mut map, headers::VERSION, PROTOCOL_VERSION)?;
        insert_header(&mut map, headers::AMOUNT, &self.amount.normalize().to_string())?;
        insert_header(&mut map, headers::CURRENCY, self.currency.as_str())?;
        insert_header(&mut map, headers::RECIPIENT, &self.recipient)?;
        insert_header(&mut map, headers::REFERENCE, &self.reference)?;
        insert_header(&mut map, headers::EXPIRES, &self.expires.to_string())?;
        if let Some(network) = &self.network {
            insert_header(&mut map, headers::NETWORK, network)?;
        }
        Ok(map)
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.expires, 0).unwrap_or_default()
    }

    /// Whether the challenge can no longer be paid at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now.timestamp()
    }
}

fn insert_header(map: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        X402Error::config(name, format!("'{}' is not a valid header value", value))
    })?;
    map.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Signature/reference pair proving a requirement was paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// Signature produced by the payment executor
    pub signature: String,
    /// Reference of the challenge being paid
    pub reference: String,
}

impl PaymentProof {
    /// Create a new proof
    pub fn new(signature: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            reference: reference.into(),
        }
    }

    /// Extract a proof from request headers; both fields must be present and non-empty
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let field = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        Some(Self::new(
            field(headers::PAYMENT_SIGNATURE)?,
            field(headers::PAYMENT_REFERENCE)?,
        ))
    }

    /// Attach the proof to outgoing request headers
    pub fn apply(&self, map: &mut HeaderMap) -> Result<()> {
        insert_header(map, headers::PAYMENT_SIGNATURE, &self.signature)?;
        insert_header(map, headers::PAYMENT_REFERENCE, &self.reference)
    }
}

/// Verified payment attached to an admitted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub signature: String,
    pub reference: String,
    pub amount: Decimal,
    pub currency: Currency,
    /// Paying address, when the verifier reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(rename = "verifiedAt")]
    pub verified_at: DateTime<Utc>,
}

/// Payment made by the client while completing a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMade {
    pub amount: Decimal,
    pub currency: Currency,
    pub signature: String,
}

/// Successful outcome of [`X402Client::execute`](crate::client::X402Client::execute)
#[derive(Debug, Clone)]
pub struct X402Response {
    /// Response body; `None` when empty, a JSON string when not valid JSON
    pub data: Option<Value>,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Set when a challenge was paid to obtain this response
    pub payment_made: Option<PaymentMade>,
}

impl X402Response {
    /// Decode the response body into a typed value
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data.clone().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| X402Error::Api {
            message: format!("Unexpected response body: {}", e),
            code: "INVALID_RESPONSE".to_string(),
            status: Some(self.status),
            details: self.data.clone().unwrap_or(Value::Null),
        })
    }
}
