//! # x402 SDK
//!
//! Client engine and server guard for the HTTP 402 "payment required" handshake.
//!
//! A client requests a resource; the server may answer `402 Payment Required`
//! with a challenge in `X-402-*` headers. The client validates the challenge
//! against its payment policy, pays through a [`PaymentExecutor`] and retries
//! once with the payment proof attached. The server verifies the proof and makes
//! sure each payment reference is spent only once.
//!
//! ## Features
//!
//! - **Retrying request engine**: transport and rate-limit retries, per-call
//!   payment ceilings, timeouts that are never retried
//! - **Atomic challenge parsing**: a challenge is usable as a whole or rejected
//! - **Replay guard**: verify, consume and forward, in that order, per reference
//! - **Pluggable capabilities**: payment executor, payment verifier and
//!   reference store are traits
//! - **Axum integration**: `from_fn` middleware and a tower layer (feature `axum`, default)
//! - **Redis reference store**: shared replay protection (feature `redis`)
//!
//! ## Quick Start
//!
//! ### Paying for a resource
//!
//! ```rust,no_run
//! use x402_sdk::{
//!     client::{ClientConfig, X402Client},
//!     executor::PaymentExecutor,
//!     BoxError, PaymentRequirement,
//! };
//!
//! struct Wallet;
//!
//! #[async_trait::async_trait]
//! impl PaymentExecutor for Wallet {
//!     async fn execute(&self, requirement: &PaymentRequirement) -> Result<String, BoxError> {
//!         // Build, sign and submit the transfer here
//!         Ok(format!("sig-for-{}", requirement.reference))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = X402Client::new(ClientConfig::from_env()?)?.with_executor(Wallet);
//!
//!     let response = client.get("https://api.example.com/premium/joke").await?;
//!     println!("{:?}", response.data);
//!     Ok(())
//! }
//! ```
//!
//! ### Protecting a route
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use rust_decimal::Decimal;
//! use x402_sdk::{
//!     client::ClientConfig,
//!     facilitator::FacilitatorClient,
//!     middleware::{payment_middleware, PaymentGuard, PaymentGuardConfig},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let facilitator = FacilitatorClient::new(ClientConfig::new().with_api_key("key"))?;
//!     let guard = PaymentGuard::new(
//!         PaymentGuardConfig::new(Decimal::new(1, 2), "RecipientAddress"),
//!         facilitator,
//!     );
//!
//!     let app = Router::new()
//!         .route("/premium/joke", get(|| async { "Why do programmers prefer dark mode?" }))
//!         .route_layer(axum::middleware::from_fn_with_state(guard, payment_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`types`**: Challenge requirements, proofs, outcomes and wire constants
//! - **`client`**: Retrying request engine and error classifier
//! - **`executor`**: Payment executor capability
//! - **`facilitator`**: Payment verifier capability and verification service client
//! - **`middleware`**: Replay guard, challenge issuance and axum integration
//! - **`reference_store`**: Consumed-reference storage
//! - **`error`**: Error taxonomy

pub mod client;
pub mod error;
pub mod executor;
pub mod facilitator;
pub mod middleware;
pub mod reference_store;
pub mod types;

// Re-exports for convenience
pub use client::X402Client;
pub use error::{BoxError, Result, X402Error};
pub use executor::PaymentExecutor;
pub use facilitator::PaymentVerifier;
pub use reference_store::ReferenceStore;
pub use types::*;

/// Current version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
