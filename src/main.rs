//! authgate — OAuth 2.0 authorization server for local accounts.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use authgate::{cli::Cli, config::Config, server::AuthServer, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            apply_cli_overrides(&mut config, &cli);
            config
        }
        Err(e) => {
            eprintln!("authgate: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Setup tracing
    if let Err(e) = setup_tracing(&config.log_output, config.log_level) {
        eprintln!("authgate: failed to setup logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %format!("https://{}:{}", config.server_name, config.port),
        applications = config.applications.len(),
        resources = config.resources.len(),
        "Starting authgate"
    );

    // Create and run the server
    let server = match AuthServer::new(&config, &cli.state_file) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Merge command-line overrides into a loaded configuration.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.log_level = config.log_level.bump(cli.verbose);
}

#[cfg(test)]
mod tests {
    use super::*;
    use authgate::config::LogLevel;

    fn make_cli(port: Option<u16>, verbose: u8) -> Cli {
        Cli {
            config: None,
            state_file: "authgate.state".into(),
            port,
            verbose,
        }
    }

    #[test]
    fn no_overrides_preserves_config() {
        let mut config = Config::default();
        let original_port = config.port;

        apply_cli_overrides(&mut config, &make_cli(None, 0));

        assert_eq!(config.port, original_port);
        assert_eq!(config.log_level, LogLevel::Error);
    }

    #[test]
    fn port_override() {
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &make_cli(Some(9443), 0));
        assert_eq!(config.port, 9443);
    }

    #[test]
    fn verbosity_bumps_log_level() {
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &make_cli(None, 1));
        assert_eq!(config.log_level, LogLevel::Info);

        let mut config = Config::default();
        apply_cli_overrides(&mut config, &make_cli(None, 3));
        assert_eq!(config.log_level, LogLevel::Debug);
    }
}
