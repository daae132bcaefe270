//! Authorization server metadata (RFC 8414 / OpenID Connect discovery).
//!
//! The same document type is built by the server at startup and parsed by
//! the client helper during discovery, so the optional fields default to
//! empty on ingest.

use serde::{Deserialize, Deserializer, Serialize};

/// The discovery document served under the well-known paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Authorization server issuer URL
    pub issuer: String,

    /// Authorization endpoint URL
    pub authorization_endpoint: String,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// UserInfo endpoint URL
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,

    /// JWK set URL
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Dynamic client registration endpoint
    #[serde(default)]
    pub registration_endpoint: Option<String>,

    /// Token introspection endpoint
    #[serde(default)]
    pub introspection_endpoint: Option<String>,

    /// Supported scopes (tolerates a space-separated string on ingest)
    #[serde(default, deserialize_with = "deserialize_scopes")]
    pub scopes_supported: Vec<String>,

    /// Supported response types
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// Supported subject identifier types
    #[serde(default)]
    pub subject_types_supported: Vec<String>,

    /// Supported ID token signing algorithms
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,

    /// Supported claims
    #[serde(default)]
    pub claims_supported: Vec<String>,

    /// Supported token endpoint auth methods
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// Supported grant types
    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    /// Supported PKCE code challenge methods
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Some implementations return `"a b"` instead of `["a", "b"]`.
fn deserialize_scopes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s.split_whitespace().map(String::from).collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

impl ProviderMetadata {
    /// Build the document for a server with the given issuer base URL
    /// (`https://name:port`) and registered resource scopes.
    #[must_use]
    pub fn for_server(issuer_base: &str, resource_scopes: &[&str]) -> Self {
        let mut scopes: Vec<String> = std::iter::once("openid".to_string())
            .chain(resource_scopes.iter().map(|s| (*s).to_string()))
            .collect();
        scopes.dedup();

        Self {
            issuer: format!("{issuer_base}/"),
            authorization_endpoint: format!("{issuer_base}/authorize"),
            token_endpoint: format!("{issuer_base}/token"),
            userinfo_endpoint: Some(format!("{issuer_base}/userinfo")),
            jwks_uri: Some(format!("{issuer_base}/.well-known/jwks.json")),
            registration_endpoint: Some(format!("{issuer_base}/register")),
            introspection_endpoint: Some(format!("{issuer_base}/introspect")),
            scopes_supported: scopes,
            response_types_supported: vec![
                "code".to_string(),
                "id_token".to_string(),
                "token".to_string(),
            ],
            subject_types_supported: vec!["pairwise".to_string(), "public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            claims_supported: vec![
                "email".to_string(),
                "name".to_string(),
                "phone_number".to_string(),
                "preferred_username".to_string(),
                "sub".to_string(),
                "updated_at".to_string(),
            ],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
            grant_types_supported: vec![
                "authorization_code".to_string(),
                "password".to_string(),
                "refresh_token".to_string(),
            ],
            code_challenge_methods_supported: vec!["S256".to_string()],
        }
    }

    /// Whether the server advertises S256 PKCE support.
    #[must_use]
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == "S256")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_document_has_required_fields() {
        let meta = ProviderMetadata::for_server(
            "https://auth.example.com:9443",
            &["private", "public", "shared"],
        );

        assert_eq!(meta.issuer, "https://auth.example.com:9443/");
        assert_eq!(
            meta.authorization_endpoint,
            "https://auth.example.com:9443/authorize"
        );
        assert_eq!(meta.token_endpoint, "https://auth.example.com:9443/token");
        assert_eq!(
            meta.jwks_uri.as_deref(),
            Some("https://auth.example.com:9443/.well-known/jwks.json")
        );
        assert_eq!(
            meta.scopes_supported,
            vec!["openid", "private", "public", "shared"]
        );
        assert_eq!(meta.response_types_supported, vec!["code", "id_token", "token"]);
        assert_eq!(meta.subject_types_supported, vec!["pairwise", "public"]);
        assert_eq!(meta.id_token_signing_alg_values_supported, vec!["RS256"]);
        assert_eq!(meta.token_endpoint_auth_methods_supported, vec!["none"]);
        assert_eq!(
            meta.grant_types_supported,
            vec!["authorization_code", "password", "refresh_token"]
        );
        assert!(meta.supports_pkce());
    }

    #[test]
    fn round_trips_through_json() {
        let meta = ProviderMetadata::for_server("https://auth.example.com:9443", &["public"]);
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: ProviderMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.issuer, meta.issuer);
        assert_eq!(parsed.scopes_supported, meta.scopes_supported);
    }

    #[test]
    fn scopes_tolerate_space_separated_string() {
        let json = r#"{
            "issuer": "https://auth.example.com/",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "scopes_supported": "openid private shared"
        }"#;
        let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.scopes_supported, vec!["openid", "private", "shared"]);
    }

    #[test]
    fn minimal_document_parses() {
        let json = r#"{
            "issuer": "https://auth.example.com/",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token"
        }"#;
        let meta: ProviderMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.registration_endpoint.is_none());
        assert!(!meta.supports_pkce());
    }
}
