//! `POST /register` — RFC 7591 dynamic client registration.
//!
//! Registration requires authentication, and membership in the
//! `RegisterGroup` when one is configured. The first redirect URI becomes
//! the registered one; the generated client id is 128 random bits,
//! base64url-encoded.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::Url;

use super::identity::RequestIdentity;
use super::state::{Application, ServerState};
use crate::pkce;

/// RFC 7591 registration request body.
#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    /// Redirection URIs; the first entry is registered
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// Human-readable client name
    #[serde(default)]
    pub client_name: Option<String>,
    /// Client home page
    #[serde(default)]
    pub client_uri: Option<String>,
    /// Logo URI
    #[serde(default)]
    pub logo_uri: Option<String>,
    /// Terms-of-service URI
    #[serde(default)]
    pub tos_uri: Option<String>,
}

/// RFC 7591 registration response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Generated client identifier
    pub client_id: String,
    /// Registered redirection URIs
    pub redirect_uris: Vec<String>,
    /// Echoed client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Echoed client home page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    /// Echoed logo URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    /// Echoed terms-of-service URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
}

/// `POST /register`
pub async fn register(
    State(state): State<Arc<ServerState>>,
    Extension(identity): Extension<Option<RequestIdentity>>,
    body: Bytes,
) -> Response {
    let Some(identity) = identity else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    if let Some(group) = state.register_group {
        if !identity.in_group(group) {
            error!(username = %identity.username, group, "Caller not in register group");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Ok(request) = serde_json::from_slice::<RegistrationRequest>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Some(redirect_uri) = request.redirect_uris.first() else {
        error!("Missing redirect_uris in registration request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    // The redirect target must be an absolute URI.
    if Url::parse(redirect_uri).is_err() {
        error!(%redirect_uri, "Bad redirect_uri in registration request");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let client_id = pkce::generate_client_id();
    let app = state.applications.add(Application {
        client_id: client_id.clone(),
        redirect_uri: redirect_uri.clone(),
        client_name: request.client_name.clone(),
        client_uri: request.client_uri.clone(),
        logo_uri: request.logo_uri.clone(),
        tos_uri: request.tos_uri.clone(),
    });

    info!(%client_id, registered_by = %identity.username, "Registered application");

    (
        StatusCode::CREATED,
        Json(RegistrationResponse {
            client_id: app.client_id,
            redirect_uris: vec![app.redirect_uri],
            client_name: app.client_name,
            client_uri: app.client_uri,
            logo_uri: app.logo_uri,
            tos_uri: app.tos_uri,
        }),
    )
        .into_response()
}
