//! Request preflight — Host validation and path hygiene.
//!
//! Runs before anything else on every request. Request-line and
//! HTTP-version validation, absolute-form URI stripping, and
//! `Expect: 100-continue` handling happen below us in hyper; what is left
//! for the application is rejecting traversal attempts and requests
//! addressed to the wrong virtual host.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::state::ServerState;

/// Validate the request path and `Host` header; 400 on any mismatch.
pub async fn preflight_middleware(
    State(state): State<Arc<ServerState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    state.num_clients.fetch_add(1, Ordering::Relaxed);

    let path = request.uri().path();
    if path.contains("/../") {
        debug!(%path, "Rejected path traversal");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());

    match host {
        Some(value) if host_matches(value, &state.name, state.port) => next.run(request).await,
        other => {
            debug!(
                host = other.unwrap_or("<missing>"),
                expected = %format!("{}:{}", state.name, state.port),
                "Rejected bad Host header"
            );
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Compare a `Host` header value against the configured identity.
///
/// The name comparison is case-insensitive and tolerates a trailing dot;
/// a missing port means the HTTPS default of 443.
fn host_matches(value: &str, name: &str, port: u16) -> bool {
    let (host, host_port) = match value.rsplit_once(':') {
        Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
            match p.parse::<u16>() {
                Ok(p) => (h, p),
                Err(_) => return false,
            }
        }
        _ => (value, 443),
    };

    let host = host.strip_suffix('.').unwrap_or(host);
    host.eq_ignore_ascii_case(name) && host_port == port
}
