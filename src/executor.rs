//! Payment executor capability
//!
//! The client engine never builds or signs transactions itself. When it decides
//! to pay a challenge it hands the validated [`PaymentRequirement`] to a
//! [`PaymentExecutor`], which returns the signature of the payment it made.
//! Errors from the executor are opaque to the engine and surface as
//! [`X402Error::Executor`](crate::X402Error::Executor).

use crate::error::BoxError;
use crate::types::PaymentRequirement;
use async_trait::async_trait;
use std::sync::Arc;

/// Turns a payment requirement into a signed payment
#[async_trait]
pub trait PaymentExecutor: Send + Sync {
    /// Pay `requirement` and return the payment signature
    async fn execute(&self, requirement: &PaymentRequirement) -> Result<String, BoxError>;
}

#[async_trait]
impl<T: PaymentExecutor + ?Sized> PaymentExecutor for Arc<T> {
    async fn execute(&self, requirement: &PaymentRequirement) -> Result<String, BoxError> {
        (**self).execute(requirement).await
    }
}
