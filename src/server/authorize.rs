//! `/authorize` — the two-phase Authorization Code endpoint.
//!
//! Phase 1 (GET) validates the query parameters and answers with a minimal
//! HTML login form that posts back here, carrying every parameter forward
//! as hidden fields. Phase 2 (POST) re-validates, checks the credentials
//! against the Authenticator, mints a grant token bound to the application
//! and PKCE challenge, and redirects back to the registered URI.
//!
//! Per RFC 6749 §4.1.2.1, failures after the client has been resolved are
//! reported by redirecting to the registered `redirect_uri` with `error=`
//! and the original `state`; everything before that is a plain 400.

use std::sync::Arc;

use axum::extract::{RawForm, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, info};

use super::state::{Application, ServerState};
use super::token_store::TokenKind;

/// Scope granted when the client does not ask for one.
pub const DEFAULT_SCOPE: &str = "private shared";

#[derive(Debug, Default, Deserialize)]
struct AuthorizeParams {
    client_id: Option<String>,
    redirect_uri: Option<String>,
    response_type: Option<String>,
    scope: Option<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// `GET /authorize` — validate and render the login form.
pub async fn form(
    State(state): State<Arc<ServerState>>,
    RawQuery(query): RawQuery,
) -> Response {
    let Ok(params) = serde_urlencoded::from_str::<AuthorizeParams>(query.as_deref().unwrap_or(""))
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if params.code_challenge_method.as_deref().is_some_and(|m| m != "S256") {
        error!(
            method = params.code_challenge_method.as_deref().unwrap_or(""),
            "Bad code_challenge_method in authorize request"
        );
        return StatusCode::BAD_REQUEST.into_response();
    }

    let app = match validate(&state, &params) {
        Ok(app) => app,
        Err(response) => return response,
    };

    let page = login_page(&params, &app);
    Html(page).into_response()
}

/// `POST /authorize` — check credentials and issue the grant.
pub async fn submit(
    State(state): State<Arc<ServerState>>,
    RawForm(body): RawForm,
) -> Response {
    let Ok(params) = serde_urlencoded::from_bytes::<AuthorizeParams>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let app = match validate(&state, &params) {
        Ok(app) => app,
        Err(response) => return response,
    };

    let redirect_uri = app.redirect_uri.clone();
    let state_param = params.state.as_deref();

    let user = params
        .username
        .as_deref()
        .zip(params.password.as_deref())
        .and_then(|(username, password)| {
            state
                .authenticator
                .authenticate(username, password)
                .map(|identity| (username, identity))
        });

    let Some((username, identity)) = user else {
        info!(
            username = params.username.as_deref().unwrap_or(""),
            "Authorization login failed"
        );
        return error_redirect(
            &redirect_uri,
            "access_denied",
            "Bad username or password.",
            state_param,
        );
    };

    let scope = params.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
    let grant = state.tokens.create(
        TokenKind::Grant,
        Some(&app),
        username,
        identity,
        scope,
        params.code_challenge.clone(),
    );

    info!(client_id = %app.client_id, %username, "Issued grant token");

    let mut query = vec![("code", grant.id.as_str())];
    if let Some(s) = state_param {
        query.push(("state", s));
    }
    redirect_with_query(&redirect_uri, &query)
}

/// Shared parameter validation for both phases; errors are full responses.
fn validate(state: &ServerState, params: &AuthorizeParams) -> Result<Application, Response> {
    let bad_request = || Err(StatusCode::BAD_REQUEST.into_response());

    let Some(client_id) = params.client_id.as_deref() else {
        error!("Missing client_id in authorize request");
        return bad_request();
    };
    match params.response_type.as_deref() {
        Some("code") => {}
        Some(other) => {
            error!(response_type = %other, "Bad response_type in authorize request");
            return bad_request();
        }
        None => {
            error!("Missing response_type in authorize request");
            return bad_request();
        }
    }

    // ID tokens are a future extension: refuse a scope that would require
    // one rather than silently not issuing it.
    if params
        .scope
        .as_deref()
        .is_some_and(|s| s.split_whitespace().any(|v| v == "openid"))
    {
        error!("Rejecting scope \"openid\": ID token issuance is not supported");
        return bad_request();
    }

    match state
        .applications
        .find(client_id, params.redirect_uri.as_deref())
    {
        Some(app) => Ok(app),
        None => {
            error!(%client_id, "Unknown client_id/redirect_uri in authorize request");
            bad_request()
        }
    }
}

/// 302 back to the client with `error`, `error_description`, and `state`.
fn error_redirect(
    redirect_uri: &str,
    code: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    let mut query = vec![("error", code), ("error_description", description)];
    if let Some(s) = state {
        query.push(("state", s));
    }
    redirect_with_query(redirect_uri, &query)
}

/// 302 to `uri` with the query appended, using `&` when the registered URI
/// already carries a query string.
fn redirect_with_query(uri: &str, query: &[(&str, &str)]) -> Response {
    let encoded = serde_urlencoded::to_string(query).unwrap_or_default();
    let prefix = if uri.contains('?') { '&' } else { '?' };
    let location = format!("{uri}{prefix}{encoded}");

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Render the login form with every parameter carried forward.
fn login_page(params: &AuthorizeParams, app: &Application) -> String {
    let mut hidden = String::new();
    let mut push_hidden = |name: &str, value: &str| {
        hidden.push_str(&format!(
            "    <input type=\"hidden\" name=\"{name}\" value=\"{}\">\n",
            html_escape(value)
        ));
    };

    push_hidden("client_id", app.client_id.as_str());
    push_hidden("redirect_uri", app.redirect_uri.as_str());
    push_hidden("response_type", "code");
    push_hidden("scope", params.scope.as_deref().unwrap_or(DEFAULT_SCOPE));
    if let Some(state) = params.state.as_deref() {
        push_hidden("state", state);
    }
    if let Some(challenge) = params.code_challenge.as_deref() {
        push_hidden("code_challenge", challenge);
    }

    let title = app.client_name.as_deref().unwrap_or(app.client_id.as_str());

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
           <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
           <title>Authorization</title>\n\
         </head>\n\
         <body>\n\
           <div class=\"form\">\n\
           <form action=\"/authorize\" method=\"POST\">\n\
             <h1>Authorize {title}</h1>\n\
             <div class=\"form-group\">\n\
               <label for=\"username\">Username:</label>\n\
               <input type=\"text\" name=\"username\" size=\"16\">\n\
             </div>\n\
             <div class=\"form-group\">\n\
               <label for=\"password\">Password:</label>\n\
               <input type=\"password\" name=\"password\" size=\"16\">\n\
             </div>\n\
             <div class=\"form-group\">\n\
               <input type=\"submit\" value=\"Login\">\n\
             </div>\n\
         {hidden}\
           </form>\n\
           </div>\n\
         </body>\n\
         </html>\n",
        title = html_escape(title),
        hidden = hidden,
    )
}

/// Minimal HTML attribute/body escaping.
fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_escape_neutralizes_markup() {
        assert_eq!(
            html_escape(r#"<script>"&x"</script>"#),
            "&lt;script&gt;&quot;&amp;x&quot;&lt;/script&gt;"
        );
        assert_eq!(html_escape("plain"), "plain");
    }

    #[test]
    fn login_page_carries_parameters_forward() {
        let params = AuthorizeParams {
            client_id: Some("app1".to_string()),
            scope: Some("private".to_string()),
            state: Some("xyz".to_string()),
            code_challenge: Some("abc123".to_string()),
            ..Default::default()
        };
        let app = Application::new("app1", "https://app.example.com/cb");

        let page = login_page(&params, &app);
        assert!(page.contains("name=\"client_id\" value=\"app1\""));
        assert!(page.contains("name=\"redirect_uri\" value=\"https://app.example.com/cb\""));
        assert!(page.contains("name=\"scope\" value=\"private\""));
        assert!(page.contains("name=\"state\" value=\"xyz\""));
        assert!(page.contains("name=\"code_challenge\" value=\"abc123\""));
        assert!(page.contains("name=\"password\""));
    }

    #[test]
    fn login_page_defaults_scope() {
        let params = AuthorizeParams {
            client_id: Some("app1".to_string()),
            ..Default::default()
        };
        let app = Application::new("app1", "https://app.example.com/cb");

        let page = login_page(&params, &app);
        assert!(page.contains("name=\"scope\" value=\"private shared\""));
        assert!(!page.contains("name=\"state\""));
    }

    #[test]
    fn redirect_uses_ampersand_when_uri_has_query() {
        let response = redirect_with_query("https://app.example.com/cb?x=1", &[("code", "abc")]);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(location, "https://app.example.com/cb?x=1&code=abc");

        let response = redirect_with_query("https://app.example.com/cb", &[("code", "abc")]);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(location, "https://app.example.com/cb?code=abc");
    }
}
