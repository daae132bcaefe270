//! Configuration management.
//!
//! The configuration file is line-oriented: one case-insensitive keyword per
//! line followed by its space-separated value. Unknown directives are logged
//! and ignored so configurations stay forward-compatible.
//!
//! ```text
//! ServerName auth.example.com:9443
//! Application app1 https://app.example.com/callback Example App
//! Resource private /docs /var/lib/authgate/docs
//! MaxGrantLife 5m
//! MaxTokenLife 1w
//! Option BasicAuth
//! IntrospectGroup 92
//! TestPassword not-a-real-password
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::authn::process_identity;
use crate::{Error, Result};

/// Default grant lifetime: 5 minutes.
pub const DEFAULT_GRANT_LIFE: Duration = Duration::from_secs(300);

/// Default access/renewal token lifetime: 1 week.
pub const DEFAULT_TOKEN_LIFE: Duration = Duration::from_secs(604_800);

/// Log destination selected by the `LogFile` directive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Log to standard error (default)
    #[default]
    Stderr,
    /// Append to a file
    File(PathBuf),
    /// Forward to syslog
    Syslog,
    /// Discard all log output
    None,
}

/// Log verbosity selected by the `LogLevel` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// Error messages only (default)
    #[default]
    Error,
    /// Errors and informational messages
    Info,
    /// All messages
    Debug,
}

impl LogLevel {
    /// Directive string for the tracing filter.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Raise the level by `n` steps (one per `-v` on the command line).
    #[must_use]
    pub fn bump(self, n: u8) -> Self {
        let mut level = self;
        for _ in 0..n {
            level = match level {
                Self::Error => Self::Info,
                Self::Info | Self::Debug => Self::Debug,
            };
        }
        level
    }
}

/// A client registered through the `Application` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Client identifier
    pub client_id: String,
    /// Registered redirection URI
    pub redirect_uri: String,
    /// Human-readable name, if any
    pub client_name: Option<String>,
}

/// Access scope of a configured resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// Served without authentication
    Public,
    /// Requires a Bearer token carrying the `private` scope
    Private,
    /// Requires the `shared` scope and, when set, membership in the group
    Shared(Option<u32>),
}

impl ResourceScope {
    /// Scope name as it appears in token scope strings and metadata.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Shared(_) => "shared",
        }
    }
}

/// A shared resource registered through the `Resource` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Access scope
    pub scope: ResourceScope,
    /// URL path prefix
    pub remote_path: String,
    /// Local filesystem path
    pub local_path: PathBuf,
}

/// Main configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname (no trailing dot)
    pub server_name: String,
    /// Listening port
    pub port: u16,
    /// Log destination
    pub log_output: LogOutput,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Group required for `/introspect`, if any
    pub introspect_group: Option<u32>,
    /// Group required for `/register`, if any
    pub register_group: Option<u32>,
    /// Maximum grant token lifetime
    pub max_grant_life: Duration,
    /// Maximum access/renewal token lifetime
    pub max_token_life: Duration,
    /// Accept Basic authentication as a backup to Bearer
    pub basic_auth: bool,
    /// Plaintext password that bypasses the authenticator (tests only)
    pub test_password: Option<String>,
    /// Statically registered applications
    pub applications: Vec<ApplicationConfig>,
    /// Shared resources
    pub resources: Vec<ResourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let (uid, _) = process_identity();
        Self {
            server_name: default_server_name(),
            port: 9000 + (uid % 1000) as u16,
            log_output: LogOutput::default(),
            log_level: LogLevel::default(),
            introspect_group: None,
            register_group: None,
            max_grant_life: DEFAULT_GRANT_LIFE,
            max_token_life: DEFAULT_TOKEN_LIFE,
            basic_auth: false,
            test_password: None,
            applications: Vec::new(),
            resources: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();

        for (index, raw) in content.lines().enumerate() {
            let linenum = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (keyword, value) = match line.split_once(char::is_whitespace) {
                Some((k, v)) => (k, v.trim()),
                None => (line, ""),
            };

            config.apply(keyword, value, linenum)?;
        }

        Ok(config)
    }

    fn apply(&mut self, keyword: &str, value: &str, linenum: usize) -> Result<()> {
        let missing = || Error::Config(format!("Missing value for {keyword} on line {linenum}"));

        if keyword.eq_ignore_ascii_case("Application") {
            let mut fields = value.split_whitespace();
            let client_id = fields.next().ok_or_else(missing)?;
            let redirect_uri = fields.next().ok_or_else(|| {
                Error::Config(format!(
                    "Missing redirect URI for Application on line {linenum}"
                ))
            })?;
            let name: Vec<&str> = fields.collect();
            self.applications.push(ApplicationConfig {
                client_id: client_id.to_string(),
                redirect_uri: redirect_uri.to_string(),
                client_name: (!name.is_empty()).then(|| name.join(" ")),
            });
        } else if keyword.eq_ignore_ascii_case("LogFile") {
            self.log_output = if value.is_empty() || value.eq_ignore_ascii_case("stderr") {
                LogOutput::Stderr
            } else if value == "none" {
                LogOutput::None
            } else if value.eq_ignore_ascii_case("syslog") {
                LogOutput::Syslog
            } else {
                LogOutput::File(PathBuf::from(value))
            };
        } else if keyword.eq_ignore_ascii_case("LogLevel") {
            self.log_level = if value.eq_ignore_ascii_case("error") {
                LogLevel::Error
            } else if value.eq_ignore_ascii_case("info") {
                LogLevel::Info
            } else if value.eq_ignore_ascii_case("debug") {
                LogLevel::Debug
            } else {
                return Err(Error::Config(format!(
                    "Unknown LogLevel \"{value}\" on line {linenum}"
                )));
            };
        } else if keyword.eq_ignore_ascii_case("IntrospectGroup") {
            self.introspect_group = Some(parse_gid(value, keyword, linenum)?);
        } else if keyword.eq_ignore_ascii_case("RegisterGroup") {
            self.register_group = Some(parse_gid(value, keyword, linenum)?);
        } else if keyword.eq_ignore_ascii_case("MaxGrantLife") {
            self.max_grant_life = parse_lifetime(value)
                .ok_or_else(|| Error::Config(format!("Bad time value \"{value}\" on line {linenum}")))?;
        } else if keyword.eq_ignore_ascii_case("MaxTokenLife") {
            self.max_token_life = parse_lifetime(value)
                .ok_or_else(|| Error::Config(format!("Bad time value \"{value}\" on line {linenum}")))?;
        } else if keyword.eq_ignore_ascii_case("Option") {
            if value.eq_ignore_ascii_case("BasicAuth") {
                self.basic_auth = true;
            } else {
                tracing::warn!(option = %value, line = linenum, "Unknown Option ignored");
            }
        } else if keyword.eq_ignore_ascii_case("Resource") {
            let mut fields = value.split_whitespace();
            let (scope, remote, local) = match (fields.next(), fields.next(), fields.next()) {
                (Some(s), Some(r), Some(l)) => (s, r, l),
                _ => {
                    return Err(Error::Config(format!("Bad Resource on line {linenum}")));
                }
            };
            self.resources.push(ResourceConfig {
                scope: parse_scope(scope, linenum)?,
                remote_path: remote.to_string(),
                local_path: PathBuf::from(local),
            });
        } else if keyword.eq_ignore_ascii_case("ServerName") {
            if value.is_empty() {
                return Err(missing());
            }
            let (name, port) = match value.rsplit_once(':') {
                Some((host, port_str))
                    if port_str.chars().all(|c| c.is_ascii_digit()) && !port_str.is_empty() =>
                {
                    let port = port_str.parse::<u16>().map_err(|_| {
                        Error::Config(format!("Bad port \"{port_str}\" on line {linenum}"))
                    })?;
                    (host, Some(port))
                }
                _ => (value, None),
            };
            self.server_name = name.trim_end_matches('.').to_string();
            if let Some(port) = port {
                self.port = port;
            }
        } else if keyword.eq_ignore_ascii_case("TestPassword") {
            if value.is_empty() {
                return Err(missing());
            }
            self.test_password = Some(value.to_string());
        } else {
            tracing::warn!(directive = %keyword, line = linenum, "Unknown directive ignored");
        }

        Ok(())
    }

    /// All distinct resource scope names, for the discovery metadata.
    #[must_use]
    pub fn resource_scopes(&self) -> Vec<&'static str> {
        let mut scopes: Vec<&'static str> = self.resources.iter().map(|r| r.scope.name()).collect();
        scopes.sort_unstable();
        scopes.dedup();
        scopes
    }
}

fn parse_gid(value: &str, keyword: &str, linenum: usize) -> Result<u32> {
    // Group-name resolution belongs to the OS back-end; only numeric gids
    // are accepted here.
    value.parse::<u32>().map_err(|_| {
        Error::Config(format!(
            "Bad {keyword} \"{value}\" on line {linenum} (numeric gid required)"
        ))
    })
}

fn parse_scope(value: &str, linenum: usize) -> Result<ResourceScope> {
    let lower = value.to_ascii_lowercase();
    match lower.as_str() {
        "public" => Ok(ResourceScope::Public),
        "private" => Ok(ResourceScope::Private),
        "shared" => Ok(ResourceScope::Shared(None)),
        _ => {
            if let Some(gid) = lower.strip_prefix("shared:") {
                let gid = gid.parse::<u32>().map_err(|_| {
                    Error::Config(format!("Bad shared group \"{gid}\" on line {linenum}"))
                })?;
                return Ok(ResourceScope::Shared(Some(gid)));
            }
            Err(Error::Config(format!(
                "Unknown resource scope \"{value}\" on line {linenum}"
            )))
        }
    }
}

/// Parse `N`, `Nm`, `Nh`, `Nd`, or `Nw` into a duration. Bare integers are
/// seconds.
#[must_use]
pub fn parse_lifetime(value: &str) -> Option<Duration> {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(digits_end);
    let n: u64 = digits.parse().ok()?;

    let multiplier = match unit {
        "" => 1,
        "m" | "M" => 60,
        "h" | "H" => 3600,
        "d" | "D" => 86_400,
        "w" | "W" => 604_800,
        _ => return None,
    };

    Some(Duration::from_secs(n * multiplier))
}

fn default_server_name() -> String {
    fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Lifetimes
    // =========================================================================

    #[test]
    fn lifetime_bare_integer_is_seconds() {
        assert_eq!(parse_lifetime("300"), Some(Duration::from_secs(300)));
    }

    #[test]
    fn lifetime_units() {
        assert_eq!(parse_lifetime("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_lifetime("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_lifetime("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_lifetime("1w"), Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn lifetime_rejects_garbage() {
        assert_eq!(parse_lifetime("5x"), None);
        assert_eq!(parse_lifetime("m"), None);
        assert_eq!(parse_lifetime(""), None);
    }

    // =========================================================================
    // Directive parsing
    // =========================================================================

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            "# test config\n\
             ServerName auth.example.com:9443\n\
             Application app1 https://app.example.com/cb Example App\n\
             Resource private /docs /srv/docs\n\
             Resource shared:92 /team /srv/team\n\
             MaxGrantLife 1m\n\
             MaxTokenLife 2h\n\
             Option BasicAuth\n\
             IntrospectGroup 92\n\
             LogLevel debug\n\
             TestPassword secret123\n",
        )
        .unwrap();

        assert_eq!(config.server_name, "auth.example.com");
        assert_eq!(config.port, 9443);
        assert_eq!(config.applications.len(), 1);
        assert_eq!(config.applications[0].client_id, "app1");
        assert_eq!(
            config.applications[0].client_name.as_deref(),
            Some("Example App")
        );
        assert_eq!(config.resources.len(), 2);
        assert_eq!(config.resources[1].scope, ResourceScope::Shared(Some(92)));
        assert_eq!(config.max_grant_life, Duration::from_secs(60));
        assert_eq!(config.max_token_life, Duration::from_secs(7200));
        assert!(config.basic_auth);
        assert_eq!(config.introspect_group, Some(92));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.test_password.as_deref(), Some("secret123"));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let config = Config::parse("servername example.org\nLOGLEVEL info\n").unwrap();
        assert_eq!(config.server_name, "example.org");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn server_name_trailing_dot_is_stripped() {
        let config = Config::parse("ServerName auth.example.com.\n").unwrap();
        assert_eq!(config.server_name, "auth.example.com");
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let config = Config::parse("FlumoxQuantizer yes\nServerName ok.example.com\n").unwrap();
        assert_eq!(config.server_name, "ok.example.com");
    }

    #[test]
    fn application_requires_redirect_uri() {
        assert!(Config::parse("Application app1\n").is_err());
    }

    #[test]
    fn bad_resource_scope_is_rejected() {
        assert!(Config::parse("Resource secret /a /b\n").is_err());
    }

    #[test]
    fn introspect_group_requires_numeric_gid() {
        assert!(Config::parse("IntrospectGroup admins\n").is_err());
        assert_eq!(
            Config::parse("IntrospectGroup 42\n").unwrap().introspect_group,
            Some(42)
        );
    }

    #[test]
    fn log_file_variants() {
        assert_eq!(
            Config::parse("LogFile stderr\n").unwrap().log_output,
            LogOutput::Stderr
        );
        assert_eq!(
            Config::parse("LogFile none\n").unwrap().log_output,
            LogOutput::None
        );
        assert_eq!(
            Config::parse("LogFile syslog\n").unwrap().log_output,
            LogOutput::Syslog
        );
        assert_eq!(
            Config::parse("LogFile /var/log/authgate.log\n").unwrap().log_output,
            LogOutput::File(PathBuf::from("/var/log/authgate.log"))
        );
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_grant_life, Duration::from_secs(300));
        assert_eq!(config.max_token_life, Duration::from_secs(604_800));
        assert!(!config.basic_auth);
        assert!(config.introspect_group.is_none());
        assert!((9000..10000).contains(&config.port));
    }

    #[test]
    fn log_level_bump_saturates_at_debug() {
        assert_eq!(LogLevel::Error.bump(1), LogLevel::Info);
        assert_eq!(LogLevel::Error.bump(2), LogLevel::Debug);
        assert_eq!(LogLevel::Error.bump(5), LogLevel::Debug);
        assert_eq!(LogLevel::Debug.bump(0), LogLevel::Debug);
    }

    #[test]
    fn resource_scopes_are_deduped_and_sorted() {
        let config = Config::parse(
            "Resource private /a /srv/a\n\
             Resource private /b /srv/b\n\
             Resource public /c /srv/c\n",
        )
        .unwrap();
        assert_eq!(config.resource_scopes(), vec!["private", "public"]);
    }
}
