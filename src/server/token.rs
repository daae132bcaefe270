//! `POST /token` — grant redemption.
//!
//! Three grant types:
//!
//! - `authorization_code`: consume a grant token (single use, atomic with
//!   its validation), enforce the PKCE challenge when one was bound, and
//!   issue an access/renewal pair.
//! - `password`: resource-owner credentials straight to the Authenticator;
//!   the access token carries no application binding.
//! - `refresh_token`: consume a renewal token and rotate the pair.
//!
//! Failures are a bare 400 — details go to the log, not the peer.

use std::sync::Arc;

use axum::extract::{RawForm, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, info};

use super::authorize::DEFAULT_SCOPE;
use super::state::{Application, ServerState};
use super::token_store::{Token, TokenKind};
use crate::authn::UserIdentity;
use crate::pkce;

#[derive(Debug, Deserialize)]
struct TokenParams {
    grant_type: Option<String>,
    client_id: Option<String>,
    code: Option<String>,
    redirect_uri: Option<String>,
    code_verifier: Option<String>,
    username: Option<String>,
    password: Option<String>,
    scope: Option<String>,
    refresh_token: Option<String>,
}

/// Success body for every grant type.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The opaque access token id
    pub access_token: String,
    /// Always `"access"`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    /// Renewal token for the `refresh_token` grant
    pub refresh_token: String,
}

/// `POST /token`
pub async fn token(State(state): State<Arc<ServerState>>, RawForm(body): RawForm) -> Response {
    let Ok(params) = serde_urlencoded::from_bytes::<TokenParams>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match params.grant_type.as_deref() {
        Some("authorization_code") => authorization_code(&state, &params),
        Some("password") => password(&state, &params),
        Some("refresh_token") => refresh(&state, &params),
        Some(other) => {
            error!(grant_type = %other, "Bad grant_type in token request");
            StatusCode::BAD_REQUEST.into_response()
        }
        None => {
            error!("Missing grant_type in token request");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

fn authorization_code(state: &ServerState, params: &TokenParams) -> Response {
    let (Some(client_id), Some(code)) = (params.client_id.as_deref(), params.code.as_deref())
    else {
        error!("Missing client_id or code in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Some(app) = state
        .applications
        .find(client_id, params.redirect_uri.as_deref())
    else {
        error!(%client_id, "Unknown client_id/redirect_uri in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    // Single-use: the grant leaves the store here, winner-takes-all. Any
    // validation failure after this point burns the code.
    let Some(grant) = state.tokens.consume(code, TokenKind::Grant) else {
        error!("Bad or expired code in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    if grant.client_id.as_deref() != Some(app.client_id.as_str())
        || grant.redirect_uri.as_deref() != Some(app.redirect_uri.as_str())
    {
        error!(%client_id, "Grant token bound to a different application");
        return StatusCode::BAD_REQUEST.into_response();
    }

    if let Some(challenge) = grant.challenge.as_deref() {
        let Some(verifier) = params.code_verifier.as_deref() else {
            error!("Missing code_verifier in token request");
            return StatusCode::BAD_REQUEST.into_response();
        };
        let computed = pkce::code_challenge(verifier);
        let ok: bool = computed.as_bytes().ct_eq(challenge.as_bytes()).into();
        if !ok {
            error!("Incorrect code_verifier in token request");
            return StatusCode::BAD_REQUEST.into_response();
        }
    }

    info!(client_id = %app.client_id, username = %grant.user, "Exchanged grant for access token");
    issue(state, Some(&app), &grant.user, grant_identity(&grant), &grant.scopes)
}

fn password(state: &ServerState, params: &TokenParams) -> Response {
    let (Some(username), Some(password)) =
        (params.username.as_deref(), params.password.as_deref())
    else {
        error!("Missing username or password in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let Some(identity) = state.authenticator.authenticate(username, password) else {
        info!(%username, "Password grant authentication failed");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let scope = params.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
    info!(%username, "Issued access token via password grant");
    issue(state, None, username, identity, scope)
}

fn refresh(state: &ServerState, params: &TokenParams) -> Response {
    let Some(id) = params.refresh_token.as_deref() else {
        error!("Missing refresh_token in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    // Renewal tokens rotate: the presented one is consumed and a new pair
    // is issued in its place.
    let Some(renewal) = state.tokens.consume(id, TokenKind::Renewal) else {
        error!("Bad or expired refresh_token in token request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let app = renewal
        .client_id
        .as_deref()
        .zip(renewal.redirect_uri.as_deref())
        .map(|(client_id, redirect_uri)| Application::new(client_id, redirect_uri));

    info!(username = %renewal.user, "Rotated renewal token");
    issue(
        state,
        app.as_ref(),
        &renewal.user,
        grant_identity(&renewal),
        &renewal.scopes,
    )
}

fn grant_identity(token: &Token) -> UserIdentity {
    UserIdentity {
        uid: token.uid,
        gid: token.gid,
    }
}

fn issue(
    state: &ServerState,
    app: Option<&Application>,
    user: &str,
    identity: UserIdentity,
    scopes: &str,
) -> Response {
    let access = state
        .tokens
        .create(TokenKind::Access, app, user, identity, scopes, None);
    let renewal = state
        .tokens
        .create(TokenKind::Renewal, app, user, identity, scopes, None);

    (
        StatusCode::OK,
        Json(TokenResponse {
            access_token: access.id,
            token_type: "access".to_string(),
            expires_in: state.max_token_life.as_secs(),
            refresh_token: renewal.id,
        }),
    )
        .into_response()
}
