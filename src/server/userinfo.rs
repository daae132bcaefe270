//! `GET /userinfo` — minimal OpenID Connect claims.
//!
//! Only claims derivable from the access token itself are returned; there
//! is no profile store behind this server. Requires Bearer authentication.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::identity::RequestIdentity;

/// UserInfo response claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    /// Subject identifier (the username)
    pub sub: String,
    /// Preferred username claim
    pub preferred_username: String,
    /// Last update time (token issuance, Unix seconds)
    pub updated_at: u64,
}

/// `GET /userinfo`
pub async fn userinfo(Extension(identity): Extension<Option<RequestIdentity>>) -> Response {
    let Some(identity) = identity else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    // Only a Bearer identity carries the issuing token.
    let Some(token) = identity.token.as_ref() else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    Json(UserInfoResponse {
        sub: identity.username.clone(),
        preferred_username: identity.username.clone(),
        updated_at: token.created_at,
    })
    .into_response()
}
