//! Agent configuration

use std::path::PathBuf;

use crate::logging::LogConfig;

/// Where an agent keeps its records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabaseLocation {
    #[default]
    InMemory,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Human-readable name used in log output
    pub label: String,
    pub database: DatabaseLocation,
    /// Logging is initialised by the agent only when set
    pub log: Option<LogConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            label: "agent".to_string(),
            database: DatabaseLocation::InMemory,
            log: None,
        }
    }
}

impl AgentConfig {
    pub fn in_memory(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = DatabaseLocation::File(path.into());
        self
    }

    pub fn with_logging(mut self, log: LogConfig) -> Self {
        self.log = Some(log);
        self
    }
}
