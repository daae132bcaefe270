//! Shared server state and the application (client) registry.
//!
//! One [`ServerState`] is built at startup and shared by every request task
//! behind an `Arc`. The signing key and discovery metadata are immutable
//! after startup; the three registries carry their own locks.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::resources::{Resource, ResourceRegistry};
use super::token_store::TokenStore;
use crate::authn::Authenticator;
use crate::config::{Config, ResourceScope};
use crate::keys::KeyManager;
use crate::metadata::ProviderMetadata;
use crate::{Error, Result};

/// Default home page served when the configuration maps nothing to `/index.md`.
const DEFAULT_INDEX_MD: &str = "# Authorization Server\n\n\
This is an OAuth 2.0 authorization server. Client applications use the\n\
`/authorize` and `/token` endpoints to obtain access tokens for the\n\
resources shared here.\n";

/// A registered client application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Client identifier
    pub client_id: String,
    /// Registered redirection URI
    pub redirect_uri: String,
    /// Human-readable name, if any
    pub client_name: Option<String>,
    /// Client home page, if any
    pub client_uri: Option<String>,
    /// Logo URI, if any
    pub logo_uri: Option<String>,
    /// Terms-of-service URI, if any
    pub tos_uri: Option<String>,
}

impl Application {
    /// Create an application carrying only the mandatory fields.
    #[must_use]
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            client_name: None,
            client_uri: None,
            logo_uri: None,
            tos_uri: None,
        }
    }
}

/// Ordered set of registered applications.
///
/// Contention is low (startup registration plus the occasional `/register`
/// call), so a plain mutex around a vector is enough. Insertion order is
/// preserved because `find` without a redirect URI returns the first match.
#[derive(Default)]
pub struct AppRegistry {
    entries: Mutex<Vec<Application>>,
}

impl AppRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an application, collapsing duplicates of the same
    /// (`client_id`, `redirect_uri`) pair to the existing entry.
    pub fn add(&self, app: Application) -> Application {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries
            .iter()
            .find(|a| a.client_id == app.client_id && a.redirect_uri == app.redirect_uri)
        {
            return existing.clone();
        }
        entries.push(app.clone());
        app
    }

    /// Find an application by client id, optionally requiring an exact
    /// redirect URI match. Without a redirect URI the first entry in
    /// insertion order wins.
    pub fn find(&self, client_id: &str, redirect_uri: Option<&str>) -> Option<Application> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|a| {
                a.client_id == client_id
                    && redirect_uri.is_none_or(|uri| a.redirect_uri == uri)
            })
            .cloned()
    }

    /// Number of registered applications.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Everything a request handler needs, shared across connection tasks.
pub struct ServerState {
    /// Server hostname (no trailing dot)
    pub name: String,
    /// Listening port
    pub port: u16,
    /// `https://name:port`
    pub issuer: String,
    /// Accept Basic authentication as a backup to Bearer
    pub basic_auth: bool,
    /// Group required for `/introspect`
    pub introspect_group: Option<u32>,
    /// Group required for `/register`
    pub register_group: Option<u32>,
    /// Access/renewal token lifetime (for `expires_in`)
    pub max_token_life: Duration,
    /// Registered applications
    pub applications: AppRegistry,
    /// Issued tokens
    pub tokens: TokenStore,
    /// Shared resources
    pub resources: ResourceRegistry,
    /// Account back-end
    pub authenticator: Arc<dyn Authenticator>,
    /// RS256 signing key
    pub keys: KeyManager,
    /// Startup time
    pub start_time: SystemTime,
    /// Requests served since startup
    pub num_clients: AtomicU64,
}

impl ServerState {
    /// Build the shared state: seed the registries from configuration,
    /// derive the discovery metadata, and register the built-in resources.
    pub fn new(
        config: &Config,
        keys: KeyManager,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let issuer = format!("https://{}:{}", config.server_name, config.port);

        let state = Self {
            name: config.server_name.clone(),
            port: config.port,
            issuer,
            basic_auth: config.basic_auth,
            introspect_group: config.introspect_group,
            register_group: config.register_group,
            max_token_life: config.max_token_life,
            applications: AppRegistry::new(),
            tokens: TokenStore::new(config.max_grant_life, config.max_token_life),
            resources: ResourceRegistry::new(),
            authenticator,
            keys,
            start_time: SystemTime::now(),
            num_clients: AtomicU64::new(0),
        };

        for app in &config.applications {
            let mut entry = Application::new(&app.client_id, &app.redirect_uri);
            entry.client_name = app.client_name.clone();
            state.applications.add(entry);
            debug!(client_id = %app.client_id, "Registered application");
        }

        for resource in &config.resources {
            state
                .resources
                .add(Resource::from_config(resource).map_err(|e| {
                    Error::Config(format!(
                        "Unable to access resource {}: {e}",
                        resource.local_path.display()
                    ))
                })?);
        }

        if state.resources.find("/index.md").is_none() {
            state.resources.add(Resource::static_blob(
                "/index.md",
                "text/markdown",
                ResourceScope::Public,
                DEFAULT_INDEX_MD.as_bytes().to_vec(),
            ));
        }

        // The metadata scope set reflects what is actually registered, so it
        // is computed after the resources above and before the blobs below
        // (which only ever add "public").
        let mut scopes = state.resources.scopes();
        if !scopes.contains(&"public") {
            scopes.push("public");
            scopes.sort_unstable();
        }
        let metadata = ProviderMetadata::for_server(&state.issuer, &scopes);
        let metadata_json = serde_json::to_string(&metadata)?;

        for path in [
            "/.well-known/oauth-authorization-server",
            "/.well-known/openid-configuration",
        ] {
            state.resources.add(Resource::static_blob(
                path,
                "text/json",
                ResourceScope::Public,
                metadata_json.clone().into_bytes(),
            ));
        }

        state.resources.add(Resource::static_blob(
            "/.well-known/jwks.json",
            "application/json",
            ResourceScope::Public,
            state.keys.jwks_json()?.into_bytes(),
        ));

        info!(issuer = %state.issuer, applications = state.applications.len(), "Authorization server ready");

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // AppRegistry
    // =========================================================================

    #[test]
    fn add_and_find_exact() {
        let registry = AppRegistry::new();
        registry.add(Application::new("app1", "https://app.example.com/cb"));

        let found = registry.find("app1", Some("https://app.example.com/cb"));
        assert!(found.is_some());
        assert_eq!(found.unwrap().client_id, "app1");
    }

    #[test]
    fn find_without_redirect_returns_first_in_insertion_order() {
        let registry = AppRegistry::new();
        registry.add(Application::new("app1", "https://first.example.com/cb"));
        registry.add(Application::new("app1", "https://second.example.com/cb"));

        let found = registry.find("app1", None).unwrap();
        assert_eq!(found.redirect_uri, "https://first.example.com/cb");
    }

    #[test]
    fn find_with_wrong_redirect_fails() {
        let registry = AppRegistry::new();
        registry.add(Application::new("app1", "https://app.example.com/cb"));

        assert!(registry.find("app1", Some("https://evil.example.com/cb")).is_none());
        assert!(registry.find("nope", None).is_none());
    }

    #[test]
    fn duplicates_collapse_to_existing_entry() {
        let registry = AppRegistry::new();
        let mut first = Application::new("app1", "https://app.example.com/cb");
        first.client_name = Some("First".to_string());
        registry.add(first);

        let mut dup = Application::new("app1", "https://app.example.com/cb");
        dup.client_name = Some("Second".to_string());
        let stored = registry.add(dup);

        assert_eq!(registry.len(), 1);
        assert_eq!(stored.client_name.as_deref(), Some("First"));
    }
}
