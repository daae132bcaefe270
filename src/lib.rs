//! authgate — a self-contained OAuth 2.0 Authorization Server and OpenID
//! Connect Provider backed by a local account database, plus the client
//! helper that drives the PKCE-protected Authorization Code flow against
//! it.
//!
//! # Features
//!
//! - **Authorization Code flow** with PKCE (RFC 7636), single-use grants
//! - **Password and refresh grants** (RFC 6749 §4.3, §6)
//! - **Token introspection** (RFC 7662), group-gated
//! - **Dynamic client registration** (RFC 7591), group-gated
//! - **Discovery** (RFC 8414 / OpenID Connect) with a persisted RS256 JWK set
//! - **Scope-gated resources**: public, private, and group-shared paths
//!
//! Tokens live only in memory; the RS256 signing key is the only persisted
//! state. TLS termination and the OS authentication back-end are external
//! collaborators.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authn;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod pkce;
pub mod server;

pub use error::{Error, Result};

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{LogLevel, LogOutput};

/// Setup tracing/logging according to the `LogFile`/`LogLevel` directives.
///
/// `RUST_LOG` overrides the configured level. `LogFile none` disables log
/// output entirely; `syslog` is an external sink and falls back to stderr
/// with a notice.
pub fn setup_tracing(output: &LogOutput, level: LogLevel) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    match output {
        LogOutput::None => {}
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        LogOutput::Syslog => {
            eprintln!("authgate: syslog output is not built in, logging to stderr");
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        LogOutput::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
    }

    Ok(())
}
