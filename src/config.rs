use crate::shared::ids::TableName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("settings validation failed: {0}")]
    Settings(String),
}

pub const DEFAULT_AUDIT_TABLE: &str = "skai_audit_log";
pub const DEFAULT_HISTORY_TURNS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub tables: Vec<TableName>,
    #[serde(default)]
    pub unscoped_tables: Vec<TableName>,
    pub model: ModelConfig,
    #[serde(default = "default_audit_table")]
    pub audit_table: TableName,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_audit_table() -> TableName {
    TableName::parse(DEFAULT_AUDIT_TABLE).expect("default audit table name")
}

fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}

fn default_api_key_env() -> String {
    "SKAI_MODEL_API_KEY".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_output_tokens() -> u32 {
    1024
}

impl PipelineConfig {
    pub fn default_deployment() -> Self {
        let tables = [
            "activities",
            "tasks",
            "wbs_items",
            "costs",
            "documents",
            "projects",
            "leads",
            "time_entries",
            "network_nodes",
            "network_dependencies",
        ]
        .iter()
        .map(|name| TableName::parse(name).expect("default table name"))
        .collect();
        Self {
            tables,
            unscoped_tables: vec![TableName::parse("projects").expect("default table name")],
            model: ModelConfig {
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: default_api_key_env(),
                timeout_seconds: default_timeout_seconds(),
                max_output_tokens: default_max_output_tokens(),
            },
            audit_table: default_audit_table(),
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: PipelineConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::Settings(
                "table allow-list must not be empty".to_string(),
            ));
        }
        for table in &self.unscoped_tables {
            if !self.tables.contains(table) {
                return Err(ConfigError::Settings(format!(
                    "unscoped table `{table}` is not in the allow-list"
                )));
            }
        }
        if self.tables.contains(&self.audit_table) {
            return Err(ConfigError::Settings(format!(
                "audit table `{}` must not appear in the command allow-list",
                self.audit_table
            )));
        }
        if self.model.endpoint.trim().is_empty() {
            return Err(ConfigError::Settings(
                "model endpoint must be non-empty".to_string(),
            ));
        }
        if self.model.model.trim().is_empty() {
            return Err(ConfigError::Settings(
                "model name must be non-empty".to_string(),
            ));
        }
        if self.model.timeout_seconds == 0 {
            return Err(ConfigError::Settings(
                "model timeout must be greater than zero".to_string(),
            ));
        }
        if self.history_turns == 0 {
            return Err(ConfigError::Settings(
                "history turns must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn allows_table(&self, table: &TableName) -> bool {
        self.tables.contains(table)
    }

    pub fn is_tenant_scoped(&self, table: &TableName) -> bool {
        !self.unscoped_tables.contains(table)
    }
}
