//! Tower service layer for the payment guard

use super::guard::{Admission, PaymentGuard};
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::Request;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer wrapping services in a [`PaymentGuardService`]
#[derive(Debug, Clone)]
pub struct PaymentGuardLayer {
    guard: PaymentGuard,
}

impl PaymentGuardLayer {
    pub fn new(guard: PaymentGuard) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for PaymentGuardLayer {
    type Service = PaymentGuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGuardService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Tower service that only forwards admitted requests
#[derive(Debug, Clone)]
pub struct PaymentGuardService<S> {
    inner: S,
    guard: PaymentGuard,
}

impl<S> Service<Request<Body>> for PaymentGuardService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        // The ready service is the one that must handle this request
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match guard.admit(req.headers()).await {
                Admission::Admitted(info) => {
                    req.extensions_mut().insert(info);
                    inner.call(req).await
                }
                Admission::Challenge(challenge) => Ok(challenge.into_response()),
                Admission::Rejected(err) => Ok(err.into_response()),
            }
        })
    }
}
