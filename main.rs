//! X402 Protected Server
//!
//! A demo server that sells a single resource behind a 402 challenge.
//!
//! ## Storage Backends
//!
//! - **In-Memory**: Default storage (consumed references are lost on restart)
//! - **Redis**: Persistent storage shared between instances (enable with `redis` feature)
//!
//! ## Verification
//!
//! With `X402_VERIFY_PAYMENTS=true` (the default) every proof is checked with the
//! x402 verification service at `X402_BASE_URL`. With `false` any well-formed proof
//! is accepted once, which is only suitable for local testing.

use axum::{response::Json, routing::get, Extension, Router};
use std::env;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use x402_sdk::{
    client::ClientConfig,
    facilitator::FacilitatorClient,
    middleware::{payment_middleware, PaymentGuard, PaymentGuardConfig},
    reference_store::{InMemoryReferenceStore, ReferenceStore},
    types::PaymentInfo,
    X402Error,
};

#[cfg(feature = "redis")]
use x402_sdk::reference_store::RedisReferenceStore;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let storage_type = env::var("STORAGE_BACKEND").unwrap_or_else(|_| "memory".to_string());
    let verify_payments = env::var("X402_VERIFY_PAYMENTS")
        .map(|v| !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "no"))
        .unwrap_or(true);

    let config = PaymentGuardConfig::from_env()?;
    let store = reference_store(&storage_type)?;

    let guard = if verify_payments {
        let facilitator = FacilitatorClient::new(ClientConfig::from_env()?)?;
        tracing::info!("Verifying payments with {}", facilitator.url());
        PaymentGuard::new(config, facilitator)
    } else {
        tracing::warn!("Payment verification disabled; proofs are trusted");
        PaymentGuard::trusting(config)
    }
    .with_store(store)
    .on_payment_received(|info| {
        tracing::info!(
            "Received {} {} from {}",
            info.amount,
            info.currency,
            info.sender.as_deref().unwrap_or("unknown sender")
        )
    })
    .on_payment_failed(|err| tracing::warn!("Payment failed: {}", err));

    tracing::info!(
        "Charging {} {} to {} per request",
        guard.config().amount,
        guard.config().currency,
        guard.config().recipient
    );

    let app = Router::new()
        .route("/premium/joke", get(joke_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            guard,
            payment_middleware,
        ))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("X402 protected server running on http://{}", bind_address);
    tracing::info!("GET /premium/joke - paid resource");
    tracing::info!("GET /health - health check");

    axum::serve(listener, app).await?;

    Ok(())
}

fn reference_store(
    storage_type: &str,
) -> std::result::Result<Arc<dyn ReferenceStore>, X402Error> {
    match storage_type {
        "memory" => {
            tracing::info!("Using in-memory reference store");
            Ok(Arc::new(InMemoryReferenceStore::new()))
        }
        #[cfg(feature = "redis")]
        "redis" => {
            let redis_url =
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
            let key_prefix = env::var("REDIS_KEY_PREFIX").ok();
            tracing::info!("Using Redis reference store: {}", redis_url);
            Ok(Arc::new(RedisReferenceStore::new(
                &redis_url,
                key_prefix.as_deref(),
            )?))
        }
        #[cfg(not(feature = "redis"))]
        "redis" => Err(X402Error::config(
            "STORAGE_BACKEND",
            "redis requested but the 'redis' feature is not enabled",
        )),
        other => Err(X402Error::config(
            "STORAGE_BACKEND",
            format!("unknown storage backend '{}'", other),
        )),
    }
}

/// The paid resource
async fn joke_handler(Extension(payment): Extension<PaymentInfo>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "joke": "Why do programmers prefer dark mode? Because light attracts bugs!",
        "reference": payment.reference,
    }))
}

/// Health check endpoint
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": x402_sdk::VERSION,
        "protocol_version": x402_sdk::PROTOCOL_VERSION,
    }))
}
