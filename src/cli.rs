//! Command-line interface definitions for `authgate`.

use std::path::PathBuf;

use clap::Parser;

/// OAuth 2.0 authorization server for local accounts
///
/// Issues, validates, introspects, and revokes OAuth tokens against the
/// local account database, and serves scope-gated resources next to the
/// protocol endpoints.
#[derive(Parser, Debug)]
#[command(name = "authgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTHGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the state file holding the signing key
    #[arg(short, long, env = "AUTHGATE_STATE", default_value = "authgate.state")]
    pub state_file: PathBuf,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "AUTHGATE_PORT")]
    pub port: Option<u16>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
