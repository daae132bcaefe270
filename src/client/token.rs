//! Token endpoint calls: code exchange, password grant, refresh.

use serde::Deserialize;
use tracing::debug;

use super::Provider;
use crate::{Error, Result};

/// Tokens returned from a successful `/token` call.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    /// Opaque bearer credential
    pub access_token: String,
    /// Token type as reported by the server
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until expiry
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Renewal credential, when the server issues one
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Provider {
    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        redirect_uri: &str,
        client_id: &str,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenGrant> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        self.post_token(&form).await
    }

    /// Obtain an access token with resource-owner credentials.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
        scope: Option<&str>,
    ) -> Result<TokenGrant> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }

        self.post_token(&form).await
    }

    /// Trade a renewal token for a fresh access/renewal pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let form: Vec<(&str, &str)> = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        self.post_token(&form).await
    }

    async fn post_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Authorize(format!("Token request failed: HTTP {status}")));
        }

        let grant: TokenGrant = response.json().await?;
        debug!(expires_in = ?grant.expires_in, "Obtained access token");
        Ok(grant)
    }
}
