//! Core data types for the session engine
//!
//! All types use camelCase JSON serialization so persisted records and
//! UI payloads share one shape.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Title used until the first user message arrives
pub const DEFAULT_TITLE: &str = "New Conversation";

/// Maximum number of characters taken from the first user message for a title
pub const TITLE_MAX_CHARS: usize = 100;

/// Author of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a conversation
///
/// Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier (msg-<uuid>)
    pub id: String,

    pub role: Role,

    pub content: String,

    /// Unix timestamp in milliseconds
    pub timestamp: u64,

    /// Tool call this message answers (tool role) or issues (assistant role)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    /// Create a new message with auto-generated id and timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg-{}", uuid::Uuid::new_v4()),
            role,
            content: content.into(),
            timestamp: now_millis(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message correlated to a tool call
    pub fn tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Attach tool call metadata
    pub fn with_tool_call(
        mut self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self.tool_name = Some(tool_name.into());
        self
    }
}

/// A conversation session, either live or archived in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier (sess-<uuid>)
    pub id: String,

    /// Unix timestamp in milliseconds
    pub created_at: u64,

    /// Unix timestamp in milliseconds of the last append or archive
    pub updated_at: u64,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default)]
    pub total_cost: f64,

    /// Per-session working directory override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Session {
    /// Create an empty session with a fresh id
    pub fn new(model: impl Into<String>, working_directory: Option<PathBuf>) -> Self {
        let now = now_millis();
        Self {
            id: format!("sess-{}", uuid::Uuid::new_v4()),
            created_at: now,
            updated_at: now,
            title: default_title(),
            messages: Vec::new(),
            model: model.into(),
            total_tokens: 0,
            total_cost: 0.0,
            working_directory,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Derive a session title from message content
pub fn derive_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return default_title();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}

/// Running token and cost totals for the live session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated cost in USD
    pub total_cost: f64,
    /// Number of recorded exchanges
    pub message_count: u64,
}

/// Status of a pending command in the approval state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Approved,
    Rejected,
    Executing,
    Completed,
}

impl CommandStatus {
    /// Whether the command has reached a terminal state
    pub fn is_resolved(self) -> bool {
        matches!(self, CommandStatus::Rejected | CommandStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Approved => "approved",
            CommandStatus::Rejected => "rejected",
            CommandStatus::Executing => "executing",
            CommandStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool-call-sourced action awaiting or past operator decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingCommand {
    /// Unique command identifier (cmd-<uuid>)
    pub id: String,

    /// Agent tool call this command belongs to
    pub tool_call_id: String,

    /// Live session the command was submitted in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    pub command: String,

    pub working_directory: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub status: CommandStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Unix timestamp in milliseconds
    pub created_at: u64,

    /// Unix timestamp in milliseconds of the last transition
    pub updated_at: u64,
}

/// Result of running an approved command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "output")]
pub enum CommandOutcome {
    Success(String),
    Failure(String),
}

/// Whether the agent loop is suspended on a pending command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPauseState {
    pub agent_paused: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at_tool_call_id: Option<String>,
}

/// Daily message counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub message_count: u32,

    /// Calendar day the count belongs to
    pub date: NaiveDate,
}

/// Non-expiring bonus message balance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusLedger {
    pub balance: u32,
}

/// Get the current Unix timestamp in milliseconds
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
