//! Authorization URL assembly and browser launch.

use tracing::info;

use super::Provider;
use crate::pkce;
use crate::{Error, Result};

impl Provider {
    /// Build the authorization URL for the Authorization Code flow.
    ///
    /// When a `code_verifier` is supplied the S256 `code_challenge` is
    /// derived and appended (the method defaults to `S256` server-side, so
    /// it is not sent explicitly).
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        client_id: &str,
        state: Option<&str>,
        code_verifier: Option<&str>,
        scope: Option<&str>,
    ) -> Result<String> {
        if redirect_uri.is_empty() || client_id.is_empty() {
            return Err(Error::Authorize(
                "redirect_uri and client_id are required".to_string(),
            ));
        }

        let mut query: Vec<(&str, &str)> = vec![
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(scope) = scope {
            query.push(("scope", scope));
        }
        if let Some(state) = state {
            query.push(("state", state));
        }
        let challenge = code_verifier.map(pkce::code_challenge);
        if let Some(challenge) = challenge.as_deref() {
            query.push(("code_challenge", challenge));
        }

        let encoded = serde_urlencoded::to_string(&query)
            .map_err(|e| Error::Authorize(format!("Unable to encode parameters: {e}")))?;

        let endpoint = &self.metadata.authorization_endpoint;
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{endpoint}{separator}{encoded}"))
    }

    /// Open the authorization page in the user's browser.
    ///
    /// Delegates to the platform URL handler (`open`/`xdg-open`
    /// equivalent); succeeds iff the handler exits with status 0.
    pub fn authorize(
        &self,
        redirect_uri: &str,
        client_id: &str,
        state: Option<&str>,
        code_verifier: Option<&str>,
        scope: Option<&str>,
    ) -> Result<()> {
        let url =
            self.authorization_url(redirect_uri, client_id, state, code_verifier, scope)?;
        info!(%url, "Opening browser for authorization");

        open::that(&url)
            .map_err(|e| Error::Authorize(format!("Unable to open authorization URL: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;
    use crate::metadata::ProviderMetadata;

    fn provider() -> Provider {
        Provider {
            http: Client::new(),
            metadata: ProviderMetadata::for_server("https://auth.example.com:9443", &["public"]),
        }
    }

    #[test]
    fn url_carries_all_parameters() {
        let url = provider()
            .authorization_url(
                "https://app.example.com/cb",
                "app1",
                Some("xyz"),
                None,
                Some("private shared"),
            )
            .unwrap();

        assert!(url.starts_with("https://auth.example.com:9443/authorize?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=app1"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"));
        assert!(url.contains("scope=private+shared"));
        assert!(url.contains("state=xyz"));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn verifier_becomes_s256_challenge() {
        // RFC 7636 appendix B reference pair
        let url = provider()
            .authorization_url(
                "https://app.example.com/cb",
                "app1",
                None,
                Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
                None,
            )
            .unwrap();

        assert!(url.contains("code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"));
    }

    #[test]
    fn empty_client_id_is_rejected() {
        let result = provider().authorization_url("https://app.example.com/cb", "", None, None, None);
        assert!(matches!(result, Err(Error::Authorize(_))));
    }

    #[test]
    fn endpoint_with_query_uses_ampersand() {
        let mut provider = provider();
        provider.metadata.authorization_endpoint =
            "https://auth.example.com/authorize?tenant=a".to_string();

        let url = provider
            .authorization_url("https://app.example.com/cb", "app1", None, None, None)
            .unwrap();
        assert!(url.starts_with("https://auth.example.com/authorize?tenant=a&response_type=code"));
    }
}
