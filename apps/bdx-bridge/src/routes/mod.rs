pub mod query;
pub mod root;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::ApiError;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Full gateway router. `/query` is rate limited per peer IP, so the app must be served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState) -> Router {
    let limited = query::router().route_layer(from_fn_with_state(
        state.limiter.clone(),
        enforce_rate_limit,
    ));

    Router::new()
        .merge(limited)
        .merge(root::router())
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn(log_server_errors))
}

async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>().copied()
    else {
        tracing::error!("no peer address on request; cannot apply rate limit");
        return ApiError::internal().into_response();
    };

    match limiter.check(peer.ip()) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            tracing::warn!(
                client = %peer.ip(),
                retry_after_secs = retry_after.as_secs(),
                "rate limit exceeded"
            );
            let mut response =
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
            let seconds = retry_after.as_secs().max(1).to_string();
            if let Ok(value) = HeaderValue::from_str(&seconds) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %message, "handler panicked");
    ApiError::internal().into_response()
}

async fn log_server_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = next.run(req).await;
    if response.status().is_server_error() {
        tracing::error!(%method, %path, status = response.status().as_u16(), "request failed");
    }
    response
}
