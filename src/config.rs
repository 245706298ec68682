//! Engine configuration
//!
//! Configuration is passed programmatically via `EngineConfig::default()` +
//! builder methods, or loaded from a camelCase JSON file.

use crate::error::{Result, SessionError};
use crate::policy::ApprovalPolicy;
use crate::pricing::{ModelInfo, PricingTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default cap on archived sessions
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default number of messages allowed per calendar day
pub const DEFAULT_DAILY_MESSAGE_LIMIT: u32 = 50;

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct";

/// Model cost information (per million tokens)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
}

/// Model limits
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelLimit {
    /// Maximum context tokens (0 means use the default)
    #[serde(default)]
    pub context: u32,
}

/// Pricing catalog entry that overrides or extends the built-in table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    /// Model ID (e.g., "openai/gpt-4o")
    pub id: String,
    #[serde(default)]
    pub cost: ModelCost,
    #[serde(default)]
    pub limit: ModelLimit,
}

/// Durable store backend type
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory storage (no persistence)
    Memory,
    /// File-based storage (one JSON file per record)
    #[default]
    File,
}

/// Configuration for the session engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Model assigned to new sessions
    pub default_model: String,

    /// Maximum number of archived sessions
    pub history_limit: usize,

    /// Messages allowed per day before bonus credits are spent
    pub daily_message_limit: u32,

    /// Capacity of the broadcast event channel
    pub event_capacity: usize,

    /// Archive the live session after every assistant message
    pub auto_archive: bool,

    pub storage_backend: StorageBackend,

    /// Directory for the file backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Folder the agent is restricted to; overrides the workspace root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_folder: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    pub approval: ApprovalPolicy,

    /// Pricing overrides applied on top of the built-in table
    pub models: Vec<ModelEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            daily_message_limit: DEFAULT_DAILY_MESSAGE_LIMIT,
            event_capacity: 256,
            auto_archive: true,
            storage_backend: StorageBackend::default(),
            state_dir: None,
            allowed_folder: None,
            workspace_root: None,
            approval: ApprovalPolicy::default(),
            models: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with in-memory storage
    pub fn in_memory() -> Self {
        Self {
            storage_backend: StorageBackend::Memory,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SessionError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Config(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            SessionError::Config(format!("Failed to write config file {}: {}", path.display(), e))
        })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(SessionError::Config("historyLimit must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(SessionError::Config("eventCapacity must be at least 1".to_string()));
        }
        if self.storage_backend == StorageBackend::File && self.state_dir.is_none() {
            return Err(SessionError::Config(
                "stateDir is required for the file storage backend".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in pricing table with configured overrides applied
    pub fn pricing_table(&self) -> PricingTable {
        let mut table = PricingTable::default();
        for entry in &self.models {
            let context = match entry.limit.context {
                0 => crate::pricing::DEFAULT_CONTEXT_WINDOW,
                n => n,
            };
            table.insert(
                entry.id.clone(),
                ModelInfo::new(entry.cost.input, entry.cost.output, context),
            );
        }
        table
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_backend = StorageBackend::File;
        self.state_dir = Some(dir.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_daily_message_limit(mut self, limit: u32) -> Self {
        self.daily_message_limit = limit;
        self
    }

    pub fn with_allowed_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.allowed_folder = Some(folder.into());
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval = policy;
        self
    }

    pub fn with_auto_archive(mut self, enabled: bool) -> Self {
        self.auto_archive = enabled;
        self
    }

    pub fn with_model(mut self, entry: ModelEntry) -> Self {
        self.models.push(entry);
        self
    }
}
