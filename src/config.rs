use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the depot lifecycle orchestrator
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Transition executor settings
    pub orchestrator: OrchestratorConfig,
    /// SQLite request store (only used with the `database` feature)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive, e.g. "info" or "depot_lifecycle=debug"
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Actor id recorded for automated history entries
    pub system_actor_id: String,
    /// Target type attached to audit events
    pub audit_target_type: String,
    /// Upper bound on recording the audit event after a commit
    pub audit_timeout_ms: u64,
    /// Post system messages to the request channel after a transition
    pub notifications_enabled: bool,
    /// Upper bound on the best-effort notification step
    pub notification_timeout_ms: u64,
    /// Reason recorded when a supplement upload forwards a request
    pub supplement_reason: String,
    /// Reason recorded when an export document upload schedules a request
    pub export_document_reason: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_actor_id: "system".to_string(),
            audit_target_type: "request".to_string(),
            audit_timeout_ms: 5000,
            notifications_enabled: true,
            notification_timeout_ms: 5000,
            supplement_reason: "Supplement document uploaded".to_string(),
            export_document_reason: "Export document uploaded".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite connection string
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://.depot-lifecycle/requests.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DepotConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (depot-lifecycle.toml, .depot-lifecycle-rc)
    /// 3. Environment variables (prefixed with DEPOT_LIFECYCLE_, nested keys split on `__`)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("depot-lifecycle.toml").exists() {
            builder = builder.add_source(File::with_name("depot-lifecycle"));
        }

        if Path::new(".depot-lifecycle-rc").exists() {
            builder = builder.add_source(
                File::with_name(".depot-lifecycle-rc").format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("DEPOT_LIFECYCLE")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from a single file, on top of the defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
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
