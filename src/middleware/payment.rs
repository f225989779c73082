//! Axum middleware function

use super::guard::{Admission, Challenge, PaymentGuard};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Axum middleware protecting the routes it wraps with a [`PaymentGuard`]
///
/// Admitted requests reach the handler with the verified
/// [`PaymentInfo`](crate::types::PaymentInfo) in their extensions, available
/// through `Extension<PaymentInfo>` or [`payment_info`](super::payment_info).
pub async fn payment_middleware(
    State(guard): State<PaymentGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    match guard.admit(request.headers()).await {
        Admission::Admitted(info) => {
            request.extensions_mut().insert(info);
            next.run(request).await
        }
        Admission::Challenge(challenge) => challenge.into_response(),
        Admission::Rejected(err) => err.into_response(),
    }
}

impl IntoResponse for Challenge {
    fn into_response(self) -> Response {
        match self.headers() {
            Ok(headers) => {
                (StatusCode::PAYMENT_REQUIRED, headers, Json(self.body())).into_response()
            }
            Err(err) => err.into_response(),
        }
    }
}
