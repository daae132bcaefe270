//! Authorization header processing — who is making this request?
//!
//! Runs once per request, after preflight. Three outcomes:
//!
//! - No `Authorization` header: the request proceeds anonymously.
//! - `Basic` (when enabled) or `Bearer` credentials that check out: a
//!   [`RequestIdentity`] is attached for the handlers downstream.
//! - Credentials that were presented but do not check out: 401, request
//!   over. Unsupported schemes are logged and treated as absent identity,
//!   which for a presented header also ends in 401.
//!
//! A Bearer token must exist, be of kind `access`, and be unexpired. An
//! expired token is removed on sight; a wrong-kind token is treated as
//! missing.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{debug, info, warn};

use super::state::ServerState;
use super::token_store::{Token, TokenKind};
use crate::authn::MAX_GROUPS;

/// Authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Authenticated username
    pub username: String,
    /// Numeric user id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    /// All group memberships, primary included, capped at 100
    pub groups: Vec<u32>,
    /// The access token used, for Bearer requests
    pub token: Option<Token>,
}

impl RequestIdentity {
    /// Whether the identity belongs to the given group.
    #[must_use]
    pub fn in_group(&self, gid: u32) -> bool {
        self.groups.contains(&gid)
    }
}

/// Resolve the `Authorization` header into a [`RequestIdentity`] extension.
pub async fn identity_middleware(
    State(state): State<Arc<ServerState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let identity = match header_value.as_deref() {
        None | Some("") => None,
        Some(value) => match resolve(&state, value) {
            Some(identity) => Some(identity),
            // Credentials were presented and rejected.
            None => return StatusCode::UNAUTHORIZED.into_response(),
        },
    };

    request.extensions_mut().insert::<Option<RequestIdentity>>(identity);
    next.run(request).await
}

fn resolve(state: &ServerState, value: &str) -> Option<RequestIdentity> {
    if let Some(encoded) = value.strip_prefix("Basic ") {
        if !state.basic_auth {
            warn!("Basic authentication disabled (missing Option BasicAuth)");
            return None;
        }
        return resolve_basic(state, encoded.trim());
    }

    if let Some(id) = value.strip_prefix("Bearer ") {
        return resolve_bearer(state, id.trim());
    }

    let scheme = value.split_whitespace().next().unwrap_or(value);
    warn!(%scheme, "Unsupported Authorization scheme");
    None
}

fn resolve_basic(state: &ServerState, encoded: &str) -> Option<RequestIdentity> {
    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())?;
    let (username, password) = decoded.split_once(':')?;

    let Some(user) = state.authenticator.authenticate(username, password) else {
        info!(%username, "Basic authentication failed");
        return None;
    };

    let mut groups = state.authenticator.groups(username, user.gid);
    groups.truncate(MAX_GROUPS);

    info!(%username, "Authenticated using Basic");
    Some(RequestIdentity {
        username: username.to_string(),
        uid: user.uid,
        gid: user.gid,
        groups,
        token: None,
    })
}

fn resolve_bearer(state: &ServerState, id: &str) -> Option<RequestIdentity> {
    // find() evicts expired tokens on sight.
    let Some(token) = state.tokens.find(id) else {
        info!("Bearer token not found or expired");
        return None;
    };

    if token.kind != TokenKind::Access {
        info!(kind = token.kind.as_str(), "Bearer token is of the wrong kind");
        return None;
    }

    let mut groups = state.authenticator.groups(&token.user, token.gid);
    groups.truncate(MAX_GROUPS);

    debug!(username = %token.user, "Authenticated using Bearer");
    Some(RequestIdentity {
        username: token.user.clone(),
        uid: token.uid,
        gid: token.gid,
        groups,
        token: Some(token),
    })
}
