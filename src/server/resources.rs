//! Scope-tagged resource registry and the GET/HEAD file handler.
//!
//! Every request path that is not one of the protocol endpoints is resolved
//! against this registry by longest matching `remote_path` prefix. A
//! resource is one of:
//!
//! | Kind | Backing |
//! |------|---------|
//! | `Directory` | a local directory tree |
//! | `UserDirectory` | a directory template with `~` replaced by the username |
//! | `File` | a single local file |
//! | `CachedFile` | a local file read once at registration |
//! | `StaticBlob` | bytes baked in at startup (metadata, JWKS, home page) |
//!
//! Access is gated by the resource scope before any filesystem work: public
//! resources are served unconditionally, `private`/`shared` require a Bearer
//! token carrying that scope, and `shared` additionally requires membership
//! in the resource group when one is configured.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use tracing::{debug, error};

use super::identity::RequestIdentity;
use super::state::ServerState;
use crate::config::{ResourceConfig, ResourceScope};

/// Resource backing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Explicit directory
    Directory,
    /// Wildcard user directory (`~` in the local path)
    UserDirectory,
    /// Explicit file
    File,
    /// File cached in memory at registration
    CachedFile,
    /// In-memory blob
    StaticBlob,
}

/// A registered resource.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Backing type
    pub kind: ResourceKind,
    /// URL path prefix (or exact path)
    pub remote_path: String,
    /// Local path for filesystem-backed kinds
    pub local_path: Option<PathBuf>,
    /// MIME type; sniffed from the extension when absent
    pub content_type: Option<String>,
    /// Access scope
    pub scope: ResourceScope,
    /// In-memory content for static and cached kinds
    pub data: Option<Arc<[u8]>>,
}

impl Resource {
    /// Build a resource from a configuration directive.
    ///
    /// A local path containing a `~` component becomes a wildcard user
    /// directory; otherwise the path is `stat`ed to pick file vs directory,
    /// and a missing path is a configuration error.
    pub fn from_config(config: &ResourceConfig) -> std::io::Result<Self> {
        let local = config.local_path.clone();

        let kind = if local.to_string_lossy().contains('~') {
            ResourceKind::UserDirectory
        } else if std::fs::metadata(&local)?.is_dir() {
            ResourceKind::Directory
        } else {
            ResourceKind::File
        };

        Ok(Self {
            kind,
            remote_path: config.remote_path.clone(),
            local_path: Some(local),
            content_type: None,
            scope: config.scope,
            data: None,
        })
    }

    /// Build an in-memory resource.
    #[must_use]
    pub fn static_blob(
        remote_path: &str,
        content_type: &str,
        scope: ResourceScope,
        data: Vec<u8>,
    ) -> Self {
        Self {
            kind: ResourceKind::StaticBlob,
            remote_path: remote_path.to_string(),
            local_path: None,
            content_type: Some(content_type.to_string()),
            scope,
            data: Some(Arc::from(data)),
        }
    }

    /// Build a cached-file resource, reading the file once.
    pub fn cached_file(
        remote_path: &str,
        local_path: PathBuf,
        content_type: Option<&str>,
        scope: ResourceScope,
    ) -> std::io::Result<Self> {
        let data = std::fs::read(&local_path)?;
        Ok(Self {
            kind: ResourceKind::CachedFile,
            remote_path: remote_path.to_string(),
            local_path: Some(local_path),
            content_type: content_type.map(str::to_string),
            scope,
            data: Some(Arc::from(data)),
        })
    }

    /// Whether `path` falls under this resource's remote prefix.
    fn matches(&self, path: &str) -> bool {
        let prefix = self.remote_path.as_str();
        path.strip_prefix(prefix).is_some_and(|rest| {
            rest.is_empty() || rest.starts_with('/') || prefix == "/"
        })
    }
}

/// Ordered set of resources; read-dominated, guarded by a reader/writer lock.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: RwLock<Vec<Resource>>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource.
    pub fn add(&self, resource: Resource) {
        debug!(remote = %resource.remote_path, kind = ?resource.kind, "Registered resource");
        self.entries.write().push(resource);
    }

    /// Find the best (longest-prefix) match for a request path. Ties go to
    /// the earliest registered entry.
    pub fn find(&self, path: &str) -> Option<Resource> {
        let entries = self.entries.read();
        let mut best: Option<&Resource> = None;
        for resource in entries.iter().filter(|r| r.matches(path)) {
            // Strictly longer wins, so the first entry keeps a tie.
            if best.is_none_or(|b| resource.remote_path.len() > b.remote_path.len()) {
                best = Some(resource);
            }
        }
        best.cloned()
    }

    /// Distinct scope names across all registered resources, sorted.
    pub fn scopes(&self) -> Vec<&'static str> {
        let entries = self.entries.read();
        let mut scopes: Vec<&'static str> = entries.iter().map(|r| r.scope.name()).collect();
        scopes.sort_unstable();
        scopes.dedup();
        scopes
    }
}

/// Map a request path onto the resource's local filesystem name.
///
/// For a user directory the `~` component is replaced with the
/// authenticated username before the remainder of the request path is
/// appended.
fn resolve_local(resource: &Resource, path: &str, username: Option<&str>) -> Option<PathBuf> {
    let local = resource.local_path.as_ref()?;
    let local = if resource.kind == ResourceKind::UserDirectory {
        PathBuf::from(local.to_string_lossy().replace('~', username?))
    } else {
        local.clone()
    };

    // A root prefix maps the whole request path under the local directory.
    let rest = if resource.remote_path == "/" {
        path
    } else {
        path.strip_prefix(resource.remote_path.as_str())?
    };
    if rest.is_empty() {
        Some(local)
    } else {
        Some(PathBuf::from(format!(
            "{}{rest}",
            local.to_string_lossy().trim_end_matches('/')
        )))
    }
}

/// Fallback handler: serve a registered resource for GET/HEAD, 404 anything
/// else.
pub async fn serve(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    let method = request.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = request.uri().path().to_string();
    let identity = request.extensions().get::<Option<RequestIdentity>>()
        .cloned()
        .flatten();

    let Some(resource) = state.resources.find(&path) else {
        debug!(%path, "No matching resource");
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Err(status) = authorize_access(&resource, identity.as_ref()) {
        return status.into_response();
    }

    let response = match resource.kind {
        ResourceKind::StaticBlob | ResourceKind::CachedFile => serve_blob(&resource),
        _ => {
            serve_file(
                &state,
                &resource,
                &path,
                identity.as_ref().map(|i| i.username.as_str()),
            )
            .await
        }
    };

    if method == Method::HEAD {
        let (parts, _) = response.into_parts();
        return Response::from_parts(parts, Body::empty());
    }
    response
}

/// Enforce the resource scope against the request identity.
///
/// No identity at all yields 401; an identity that lacks the required token
/// scope or group membership yields 403. Only Bearer identities carry a
/// scoped token, so Basic-authenticated requests cannot reach non-public
/// resources.
fn authorize_access(
    resource: &Resource,
    identity: Option<&RequestIdentity>,
) -> Result<(), StatusCode> {
    let scope = resource.scope;
    if scope == ResourceScope::Public {
        return Ok(());
    }

    let Some(identity) = identity else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    let Some(token) = identity.token.as_ref() else {
        return Err(StatusCode::FORBIDDEN);
    };

    match scope {
        ResourceScope::Public => Ok(()),
        ResourceScope::Private => {
            if token.has_scope("private") {
                Ok(())
            } else {
                Err(StatusCode::FORBIDDEN)
            }
        }
        ResourceScope::Shared(gid) => {
            if !token.has_scope("shared") {
                return Err(StatusCode::FORBIDDEN);
            }
            match gid {
                Some(gid) if !identity.in_group(gid) => Err(StatusCode::FORBIDDEN),
                _ => Ok(()),
            }
        }
    }
}

fn serve_blob(resource: &Resource) -> Response {
    let data = resource.data.clone().unwrap_or_else(|| Arc::from(&b""[..]));
    let content_type = resource
        .content_type
        .clone()
        .unwrap_or_else(|| sniff_content_type(&resource.remote_path).to_string());

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(data.to_vec()),
    )
        .into_response()
}

async fn serve_file(
    state: &ServerState,
    resource: &Resource,
    path: &str,
    username: Option<&str>,
) -> Response {
    let Some(mut local) = resolve_local(resource, path, username) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let Ok(info) = std::fs::metadata(&local) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // A file resource must not resolve to a directory and vice versa.
    if info.is_dir() && resource.kind == ResourceKind::File {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut serve_path = path.to_string();
    if info.is_dir() {
        if !path.ends_with('/') {
            let location = format!("https://{}:{}{}/", state.name, state.port, path);
            return redirect(&location);
        }
        match find_index(&local) {
            Some(index_local) => {
                serve_path = format!(
                    "{path}{}",
                    index_local.file_name().unwrap_or_default().to_string_lossy()
                );
                local = index_local;
            }
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    }

    let content_type = resource
        .content_type
        .clone()
        .unwrap_or_else(|| sniff_content_type(&serve_path).to_string());

    match tokio::fs::read(&local).await {
        Ok(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            Body::from(data),
        )
            .into_response(),
        Err(e) => {
            error!(local = %local.display(), error = %e, "Unable to read resource file");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn find_index(dir: &std::path::Path) -> Option<PathBuf> {
    for name in ["index.md", "index.html"] {
        let candidate = dir.join(name);
        if std::fs::metadata(&candidate).is_ok_and(|info| info.is_file()) {
            return Some(candidate);
        }
    }
    None
}

fn redirect(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// MIME type from the path extension.
fn sniff_content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "css" => "text/css",
        "html" => "text/html",
        "md" => "text/markdown",
        "jpg" | "jpeg" => "image/jpeg",
        "js" => "text/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "xml" => "text/xml",
        _ => "text/plain",
    }
}
