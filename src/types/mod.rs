//! Core types for the x402 handshake
//!
//! # Architecture
//!
//! The types module is organized as follows:
//! - [`payment`] - Challenge requirements, proofs, and outcomes
//! - [`facilitator`] - Verification service request and response types
//! - [`network`] - Network identifiers
//! - [`constants`] - Header names and configuration defaults
//!
//! # Examples
//!
//! ## Parsing a challenge
//!
//! ```
//! use x402_sdk::types::{Currency, PaymentRequirement};
//! use std::collections::HashMap;
//!
//! # fn example() -> x402_sdk::Result<()> {
//! let mut fields = HashMap::new();
//! fields.insert("X-402-Amount".to_string(), "0.05".to_string());
//! fields.insert("X-402-Recipient".to_string(), "R1".to_string());
//! fields.insert("X-402-Reference".to_string(), "pay_abc".to_string());
//! fields.insert("X-402-Expires".to_string(), "1900000000".to_string());
//!
//! let requirement = PaymentRequirement::from_map(&fields)?;
//! assert_eq!(requirement.currency, Currency::Native);
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod facilitator;
pub mod network;
pub mod payment;

// Re-export commonly used types
pub use constants::{defaults, headers, PROTOCOL_VERSION, SDK_VERSION};
pub use facilitator::{
    PaymentRequest, PaymentResponse, TransactionDetails, VerifyRequest, VerifyResponse,
};
pub use network::Network;
pub use payment::{
    Currency, PaymentInfo, PaymentMade, PaymentProof, PaymentRequirement, X402Response,
};
