use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for dockhand.
///
/// Loaded with precedence: built-in defaults, then `dockhand.toml`, then
/// `DOCKHAND_*` environment variables (double underscore separates nesting,
/// e.g. `DOCKHAND_SERVER__PORT=8080`).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DockhandConfig {
    /// The repository under management
    #[serde(default)]
    pub repository: RepositoryConfig,
    /// Main-application restart behavior
    #[serde(default)]
    pub restart: RestartConfig,
    /// HTTP listen settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging and diagnostics settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryConfig {
    /// Path to the managed working directory
    pub path: String,
    /// Timeout applied to every git invocation, in seconds
    pub command_timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: ".".to_string(),
            command_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestartConfig {
    /// Command that restarts the main application (split with shell-style
    /// quoting rules, executed without a shell). None = not configured.
    pub command: Option<String>,
    /// Restart the main application after a successful checkout
    pub on_checkout: bool,
    /// Restart the main application after a successful pull
    pub on_pull: bool,
    /// Timeout for the restart command, in seconds
    pub timeout_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            command: None,
            on_checkout: false,
            on_pull: false,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level filter when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON-structured log lines
    pub json_logs: bool,
    /// Capacity of the rolling operational log
    pub log_buffer_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            log_buffer_capacity: crate::oplog::DEFAULT_CAPACITY,
        }
    }
}

impl DockhandConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (dockhand.toml)
    /// 3. Environment variables (prefixed with DOCKHAND_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("dockhand.toml").exists() {
            builder = builder.add_source(File::with_name("dockhand"));
        }

        builder = builder.add_source(
            Environment::with_prefix("DOCKHAND")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut dockhand_config: DockhandConfig = config.try_deserialize()?;

        // Convenience aliases for the two settings every deployment sets.
        if let Ok(path) = std::env::var("DOCKHAND_REPO_PATH") {
            dockhand_config.repository.path = path;
        }
        if let Ok(command) = std::env::var("DOCKHAND_RESTART_COMMAND") {
            dockhand_config.restart.command = Some(command);
        }

        Ok(dockhand_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
