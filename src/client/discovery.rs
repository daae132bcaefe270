//! Endpoint discovery from a server root URL.

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::metadata::ProviderMetadata;
use crate::{Error, Result};

/// A discovered authorization server.
pub struct Provider {
    pub(super) http: Client,
    pub(super) metadata: ProviderMetadata,
}

impl Provider {
    /// Connect to an authorization server and discover its endpoints.
    ///
    /// Only `https` URLs are accepted. For a root URL the well-known
    /// metadata paths are tried in order before the URL itself; the first
    /// parseable document wins. The ingest is tolerant of `text/json`
    /// responses.
    pub async fn connect(uri: &str) -> Result<Self> {
        Self::connect_with(Client::new(), uri).await
    }

    /// Connect using a caller-supplied HTTP client.
    pub async fn connect_with(http: Client, uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| Error::Discovery(format!("Bad URL: {e}")))?;
        if url.scheme() != "https" {
            return Err(Error::Discovery(format!(
                "Refusing non-https authorization server \"{uri}\""
            )));
        }

        let mut last_error = None;
        for candidate in discovery_candidates(&url) {
            debug!(url = %candidate, "Trying discovery document");
            match fetch_metadata(&http, &candidate).await {
                Ok(metadata) => {
                    verify_endpoints(&metadata)?;
                    debug!(issuer = %metadata.issuer, "Discovered authorization server");
                    return Ok(Self { http, metadata });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Discovery(format!("No discovery document at {uri}"))))
    }

    /// The discovered metadata document.
    #[must_use]
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }
}

/// Well-known paths to probe, most specific first. A non-root resource
/// path is tried as given.
fn discovery_candidates(url: &Url) -> Vec<String> {
    let base = {
        let mut base = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            base.push_str(&format!(":{port}"));
        }
        base
    };

    if url.path() == "/" {
        vec![
            format!("{base}/.well-known/oauth-authorization-server"),
            format!("{base}/.well-known/openid-configuration"),
            format!("{base}/"),
        ]
    } else {
        vec![format!("{base}{}", url.path())]
    }
}

async fn fetch_metadata(http: &Client, url: &str) -> Result<ProviderMetadata> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Discovery(format!(
            "Discovery failed: HTTP {} from {url}",
            response.status()
        )));
    }

    // Servers in the wild serve this as text/json; parse the bytes and
    // ignore the declared content type.
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Discovery(format!("Bad discovery document: {e}")))
}

/// Every endpoint the helper will interact with must be https.
fn verify_endpoints(metadata: &ProviderMetadata) -> Result<()> {
    let endpoints = [
        ("authorization_endpoint", Some(metadata.authorization_endpoint.as_str())),
        ("token_endpoint", Some(metadata.token_endpoint.as_str())),
        ("registration_endpoint", metadata.registration_endpoint.as_deref()),
        ("introspection_endpoint", metadata.introspection_endpoint.as_deref()),
    ];

    for (name, value) in endpoints {
        let Some(value) = value else { continue };
        let url =
            Url::parse(value).map_err(|e| Error::Discovery(format!("Bad {name}: {e}")))?;
        if url.scheme() != "https" {
            return Err(Error::Discovery(format!("{name} is not https: {value}")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn https_metadata() -> ProviderMetadata {
        ProviderMetadata::for_server("https://auth.example.com:9443", &["public"])
    }

    // =========================================================================
    // Candidate ordering
    // =========================================================================

    #[test]
    fn root_url_probes_well_known_paths_first() {
        let url = Url::parse("https://auth.example.com:9443/").unwrap();
        assert_eq!(
            discovery_candidates(&url),
            vec![
                "https://auth.example.com:9443/.well-known/oauth-authorization-server",
                "https://auth.example.com:9443/.well-known/openid-configuration",
                "https://auth.example.com:9443/",
            ]
        );
    }

    #[test]
    fn explicit_path_is_used_as_given() {
        let url = Url::parse("https://auth.example.com/custom/metadata.json").unwrap();
        assert_eq!(
            discovery_candidates(&url),
            vec!["https://auth.example.com/custom/metadata.json"]
        );
    }

    // =========================================================================
    // Endpoint verification
    // =========================================================================

    #[test]
    fn https_endpoints_are_accepted() {
        assert!(verify_endpoints(&https_metadata()).is_ok());
    }

    #[test]
    fn plaintext_endpoint_is_rejected() {
        let mut metadata = https_metadata();
        metadata.token_endpoint = "http://auth.example.com/token".to_string();
        assert!(verify_endpoints(&metadata).is_err());
    }

    #[test]
    fn missing_optional_endpoints_are_fine() {
        let mut metadata = https_metadata();
        metadata.registration_endpoint = None;
        metadata.introspection_endpoint = None;
        assert!(verify_endpoints(&metadata).is_ok());
    }

    #[tokio::test]
    async fn non_https_server_url_is_refused() {
        let result = Provider::connect("http://auth.example.com/").await;
        assert!(matches!(result, Err(Error::Discovery(_))));
    }
}
