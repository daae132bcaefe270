//! `POST /introspect` — RFC 7662 token introspection.
//!
//! The caller must be authenticated, and when `IntrospectGroup` is
//! configured must belong to that group. The lookup deliberately does not
//! evict expired tokens, so a token that has expired but not yet been
//! swept introspects as `active: false`.

use std::sync::Arc;

use axum::extract::{RawForm, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::identity::RequestIdentity;
use super::state::ServerState;
use super::token_store::now_secs;

#[derive(Debug, Deserialize)]
struct IntrospectParams {
    token: Option<String>,
}

/// RFC 7662 introspection response.
#[derive(Debug, Serialize, Deserialize)]
pub struct IntrospectResponse {
    /// Whether the token is currently usable
    pub active: bool,
    /// Space-separated scope string
    pub scope: String,
    /// Bound client id, empty for password-grant tokens
    pub client_id: String,
    /// Authenticated username
    pub username: String,
    /// One of `access`, `grant`, `renewal`
    pub token_type: String,
    /// Expiry (Unix seconds)
    pub exp: u64,
    /// Issuance (Unix seconds)
    pub iat: u64,
}

/// `POST /introspect`
pub async fn introspect(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<Option<RequestIdentity>>,
    RawForm(body): RawForm,
) -> Response {
    let Some(identity) = identity else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if let Some(group) = state.introspect_group {
        if !identity.in_group(group) {
            error!(username = %identity.username, group, "Caller not in introspect group");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Ok(params) = serde_urlencoded::from_bytes::<IntrospectParams>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(id) = params.token.as_deref() else {
        error!("Missing token in introspect request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Some(token) = state.tokens.peek(id) else {
        error!("Bad token in introspect request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    (
        StatusCode::OK,
        Json(IntrospectResponse {
            active: token.expires_at > now_secs(),
            scope: token.scopes.clone(),
            client_id: token.client_id.clone().unwrap_or_default(),
            username: token.user.clone(),
            token_type: token.kind.as_str().to_string(),
            exp: token.expires_at,
            iat: token.created_at,
        }),
    )
        .into_response()
}
