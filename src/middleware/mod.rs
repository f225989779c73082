//! Server-side payment protection
//!
//! This module guards resources behind 402 challenges and makes sure every
//! payment reference pays for at most one request.
//!
//! # Architecture
//!
//! The middleware module is organized as follows:
//! - [`config`] - Price, payee and challenge window of a protected resource
//! - [`guard`] - The framework-agnostic replay guard and challenge issuance
//! - [`payment`] - Axum `from_fn` middleware (feature `axum`)
//! - [`service`] - Tower layer for the same pipeline (feature `axum`)
//!
//! # Examples
//!
//! ```no_run
//! use axum::{routing::get, Extension, Router};
//! use rust_decimal::Decimal;
//! use x402_sdk::middleware::{payment_middleware, PaymentGuard, PaymentGuardConfig};
//! use x402_sdk::types::PaymentInfo;
//!
//! # fn example() -> Router {
//! let guard = PaymentGuard::trusting(PaymentGuardConfig::new(Decimal::new(1, 2), "R1"))
//!     .on_payment_received(|info| println!("received {} {}", info.amount, info.currency));
//!
//! Router::new()
//!     .route(
//!         "/premium",
//!         get(|Extension(payment): Extension<PaymentInfo>| async move {
//!             format!("thanks for {}", payment.reference)
//!         }),
//!     )
//!     .route_layer(axum::middleware::from_fn_with_state(guard, payment_middleware))
//! # }
//! ```
//!
//! # Payment Flow
//!
//! 1. Request arrives without proof headers → 402 with a fresh challenge
//! 2. Request arrives with a proof for a spent reference → 402 `REPLAY_ATTACK`
//! 3. Proof is verified → reference consumed → handler runs with `PaymentInfo`
//! 4. Proof is rejected → 402 `VERIFICATION_FAILED` or `VERIFICATION_ERROR`

pub mod config;
pub mod guard;
#[cfg(feature = "axum")]
pub mod payment;
#[cfg(feature = "axum")]
pub mod service;


// Re-export commonly used types
pub use config::PaymentGuardConfig;
pub use guard::{generate_reference, payment_info, Admission, Challenge, PaymentGuard};
#[cfg(feature = "axum")]
pub use payment::payment_middleware;
#[cfg(feature = "axum")]
pub use service::{PaymentGuardLayer, PaymentGuardService};
