//! The authorization server: shared state, router, and the accept loop.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/authorize` | Login form for the Authorization Code flow |
//! | `POST` | `/authorize` | Credential check, grant issuance, redirect |
//! | `POST` | `/token` | Grant redemption (`authorization_code`, `password`, `refresh_token`) |
//! | `POST` | `/introspect` | RFC 7662 token introspection |
//! | `POST` | `/register` | RFC 7591 dynamic client registration |
//! | `GET`  | `/userinfo` | Minimal OpenID claims |
//! | `GET`/`HEAD` | anything else | Scope-gated resource lookup |
//!
//! Every request passes the preflight (Host validation, path hygiene) and
//! identity (Basic/Bearer resolution) middleware before reaching a handler.
//! TLS termination sits in front of the listener; all advertised URLs use
//! `https`.

pub mod authorize;
pub mod identity;
pub mod introspect;
pub mod preflight;
pub mod register;
pub mod resources;
pub mod state;
pub mod token;
pub mod token_store;
pub mod userinfo;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, info};

use crate::authn::{Authenticator, TestAuthenticator};
use crate::config::Config;
use crate::keys::KeyManager;
use crate::{Error, Result};

pub use state::{Application, ServerState};
pub use token_store::{Token, TokenKind, TokenStore};

/// Interval between expired-token sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The assembled authorization server.
pub struct AuthServer {
    state: Arc<ServerState>,
}

impl AuthServer {
    /// Build a server from configuration, using the `TestPassword`
    /// authenticator. Without a `TestPassword` directive there is no
    /// account back-end to talk to, which is a fatal startup error.
    pub fn new(config: &Config, state_file: &Path) -> Result<Self> {
        let authenticator: Arc<dyn Authenticator> = match &config.test_password {
            Some(password) => Arc::new(TestAuthenticator::new(password.clone())),
            None => {
                return Err(Error::AuthService(
                    "no authenticator configured (set TestPassword or embed a back-end)"
                        .to_string(),
                ));
            }
        };
        Self::with_authenticator(config, state_file, authenticator)
    }

    /// Build a server with an explicit account back-end.
    pub fn with_authenticator(
        config: &Config,
        state_file: &Path,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let keys = KeyManager::load_or_generate(state_file)?;
        let state = Arc::new(ServerState::new(config, keys, authenticator)?);
        Ok(Self { state })
    }

    /// The shared state, for embedding and tests.
    #[must_use]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all endpoints and middleware attached.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::clone(&self.state);

        Router::new()
            .route("/authorize", get(authorize::form).post(authorize::submit))
            .route("/token", post(token::token))
            .route("/introspect", post(introspect::introspect))
            .route("/register", post(register::register))
            .route("/userinfo", get(userinfo::userinfo))
            .fallback(resources::serve)
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                identity::identity_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                Arc::clone(&state),
                preflight::preflight_middleware,
            ))
            .with_state(state)
    }

    /// Bind the listener and serve until interrupted.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.port));
        let listener = TcpListener::bind(addr).await?;

        info!(
            issuer = %self.state.issuer,
            tokens_issued = self.state.tokens.issued(),
            "Listening for client connections"
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
        spawn_sweeper(
            Arc::clone(&self.state),
            SWEEP_INTERVAL,
            shutdown_tx.subscribe(),
        );

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Shutdown complete");
        Ok(())
    }
}

/// Periodically drop expired tokens. The task exits when the shutdown
/// channel fires.
fn spawn_sweeper(
    state: Arc<ServerState>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let swept = state.tokens.sweep();
                    if swept > 0 {
                        debug!(count = swept, "Swept expired tokens");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Token sweeper shutting down");
                    break;
                }
            }
        }
    });
}

async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
