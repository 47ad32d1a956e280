//! Server configuration: defaults plus environment overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use superego_primitives::{DecisionAction, Result, SuperegoError};

/// Environment variable naming the rule file.
pub const RULES_FILE_ENV: &str = "SUPEREGO_RULES_FILE";
/// Environment variable selecting the log filter.
pub const LOG_LEVEL_ENV: &str = "SUPEREGO_LOG_LEVEL";
/// Environment variable overriding the advisor deadline, in milliseconds.
pub const ADVISOR_TIMEOUT_ENV: &str = "SUPEREGO_ADVISOR_TIMEOUT_MS";
/// Environment variable selecting the failure mode for sampled requests.
pub const SAMPLE_FAILURE_MODE_ENV: &str = "SUPEREGO_SAMPLE_FAILURE_MODE";
/// Environment variable selecting the advisor implementation.
pub const ADVISOR_PROVIDER_ENV: &str = "SUPEREGO_ADVISOR_PROVIDER";
/// Environment variable naming the NDJSON audit log file.
pub const AUDIT_LOG_ENV: &str = "SUPEREGO_AUDIT_LOG";

/// Which front-ends to serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Line-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// HTTP/JSON endpoints.
    Http,
    /// WebSocket frames.
    Websocket,
    /// HTTP + WebSocket + stdio concurrently.
    Unified,
}

impl TransportKind {
    /// Returns the transport names this mode enables, for health reporting.
    #[must_use]
    pub fn enabled_transports(self) -> Vec<&'static str> {
        match self {
            Self::Stdio => vec!["stdio"],
            Self::Http => vec!["http"],
            Self::Websocket => vec!["websocket"],
            Self::Unified => vec!["stdio", "http", "websocket"],
        }
    }
}

/// Which advisor implementation answers `sample` rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdvisorProvider {
    /// Deterministic in-process mock; no credentials needed.
    #[default]
    Mock,
    /// Anthropic messages API.
    Claude,
}

/// Complete server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    host: String,
    port: u16,
    rules_file: PathBuf,
    hot_reload: bool,
    advisor_provider: AdvisorProvider,
    advisor_model: String,
    advisor_timeout: Duration,
    sample_failure_mode: DecisionAction,
    audit_log: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            rules_file: PathBuf::from("config/rules.yaml"),
            hot_reload: true,
            advisor_provider: AdvisorProvider::Mock,
            advisor_model: "claude-sonnet-4-20250514".to_owned(),
            advisor_timeout: Duration::from_secs(10),
            sample_failure_mode: DecisionAction::Deny,
            audit_log: None,
        }
    }
}

impl ServerConfig {
    /// Builds a configuration from defaults plus environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Config`] when an override has an invalid
    /// value; the binary exits with code 2 in that case.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var(RULES_FILE_ENV) {
            if path.trim().is_empty() {
                return Err(SuperegoError::config(format!("{RULES_FILE_ENV} is empty")));
            }
            config.rules_file = PathBuf::from(path);
        }

        if let Ok(raw) = env::var(ADVISOR_TIMEOUT_ENV) {
            let millis: u64 = raw.parse().map_err(|_| {
                SuperegoError::config(format!(
                    "{ADVISOR_TIMEOUT_ENV} must be a positive integer, got `{raw}`"
                ))
            })?;
            if millis == 0 {
                return Err(SuperegoError::config(format!(
                    "{ADVISOR_TIMEOUT_ENV} must be non-zero"
                )));
            }
            config.advisor_timeout = Duration::from_millis(millis);
        }

        if let Ok(raw) = env::var(SAMPLE_FAILURE_MODE_ENV) {
            config.sample_failure_mode = match raw.as_str() {
                "deny" => DecisionAction::Deny,
                "allow" => DecisionAction::Allow,
                other => {
                    return Err(SuperegoError::config(format!(
                        "{SAMPLE_FAILURE_MODE_ENV} must be `deny` or `allow`, got `{other}`"
                    )));
                }
            };
        }

        if let Ok(raw) = env::var(ADVISOR_PROVIDER_ENV) {
            config.advisor_provider = match raw.as_str() {
                "mock" => AdvisorProvider::Mock,
                "claude" => AdvisorProvider::Claude,
                other => {
                    return Err(SuperegoError::config(format!(
                        "{ADVISOR_PROVIDER_ENV} must be `mock` or `claude`, got `{other}`"
                    )));
                }
            };
        }

        if let Ok(path) = env::var(AUDIT_LOG_ENV) {
            if !path.trim().is_empty() {
                config.audit_log = Some(PathBuf::from(path));
            }
        }

        Ok(config)
    }

    /// Returns the bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the bind port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Overrides the bind port (CLI `-p`).
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Returns the rule file path.
    #[must_use]
    pub fn rules_file(&self) -> &PathBuf {
        &self.rules_file
    }

    /// Overrides the rule file path.
    pub fn set_rules_file(&mut self, path: PathBuf) {
        self.rules_file = path;
    }

    /// Returns whether the hot-reload watcher runs.
    #[must_use]
    pub const fn hot_reload(&self) -> bool {
        self.hot_reload
    }

    /// Enables or disables the hot-reload watcher.
    pub fn set_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
    }

    /// Returns the configured advisor implementation.
    #[must_use]
    pub const fn advisor_provider(&self) -> AdvisorProvider {
        self.advisor_provider
    }

    /// Returns the advisor model identifier.
    #[must_use]
    pub fn advisor_model(&self) -> &str {
        &self.advisor_model
    }

    /// Returns the advisor call deadline.
    #[must_use]
    pub const fn advisor_timeout(&self) -> Duration {
        self.advisor_timeout
    }

    /// Returns the action applied when the advisor is unavailable.
    #[must_use]
    pub const fn sample_failure_mode(&self) -> DecisionAction {
        self.sample_failure_mode
    }

    /// Returns the NDJSON audit log path, if file auditing is enabled.
    #[must_use]
    pub fn audit_log(&self) -> Option<&PathBuf> {
        self.audit_log.as_ref()
    }

    /// Enables NDJSON file auditing at `path`.
    pub fn set_audit_log(&mut self, path: PathBuf) {
        self.audit_log = Some(path);
    }
}
