use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Visualization keys read from the JSON config file shared with the frontend.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    /// Name of the timestamp column in every data table.
    pub timestamp_column_name: String,
    /// Name of the derived anomaly-window label column.
    pub label_column_name: String,
    /// Rescale data columns to [-1, 1] before replying.
    pub scale_data: bool,
    /// Columns the frontend plots by default.
    pub init_cols_for_plot: Vec<String>,
    /// Columns to select from the anomaly table; absent means all.
    #[serde(default)]
    pub cols_from_anomaly_tab: Option<Vec<String>>,
    /// Table holding analyst feedback on anomalies.
    pub feedback_table_name: String,
    /// Feedback column set by `verify_anomaly`.
    pub anomaly_feedback_col: String,
    /// Feedback column set by `anomaly_type`.
    pub anomaly_type_col: String,
    /// Port to listen on.
    pub port_number: u16,
}

/// Process-wide configuration snapshot: the frontend config file plus the
/// environment-provided deployment keys. Loaded once at startup and treated
/// as read-only afterwards.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub frontend: FrontendConfig,
    /// Dataset this deployment serves, from `DATASET_ID`.
    pub dataset_id: String,
    /// Warehouse connection string, from `DATABASE_URL`.
    pub database_url: String,
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost).
    pub bind_addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ServerConfig {
    /// Load the config file and overlay the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let frontend: FrontendConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let dataset_id = env::var("DATASET_ID")
            .map_err(|_| ConfigError::MissingEnvVar("DATASET_ID".to_string()))?;
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(Self {
            frontend,
            dataset_id,
            database_url,
            bind_addr,
        })
    }
}
