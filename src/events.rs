//! Change notifications for UI collaborators
//!
//! Every state change in the engine is broadcast as an [`EngineEvent`] so a
//! UI can re-render without duplicating engine logic.

use crate::types::{AgentPauseState, CommandStatus, DailyUsage, SessionStats};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the session engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A gated action is waiting for the operator
    #[serde(rename = "command_submitted")]
    CommandSubmitted {
        id: String,
        tool_call_id: String,
        command: String,
    },

    /// A pending command changed status
    #[serde(rename = "command_status")]
    CommandStatusChanged {
        id: String,
        tool_call_id: String,
        status: CommandStatus,
    },

    /// Resolved commands were dropped from the active set
    #[serde(rename = "commands_removed")]
    CommandsRemoved { ids: Vec<String> },

    /// Agent loop paused or resumed
    #[serde(rename = "pause_changed")]
    PauseChanged { state: AgentPauseState },

    /// A new live session began
    #[serde(rename = "session_started")]
    SessionStarted { session_id: String },

    /// A message was appended to the live session
    #[serde(rename = "message_appended")]
    MessageAppended {
        session_id: String,
        message_id: String,
    },

    /// Live session totals changed
    #[serde(rename = "stats_updated")]
    StatsUpdated { stats: SessionStats },

    /// The live session was written to history
    #[serde(rename = "session_archived")]
    SessionArchived { session_id: String },

    /// An archived session became the live session
    #[serde(rename = "session_loaded")]
    SessionLoaded { session_id: String },

    #[serde(rename = "session_deleted")]
    SessionDeleted { session_id: String },

    #[serde(rename = "history_cleared")]
    HistoryCleared,

    #[serde(rename = "daily_usage")]
    DailyUsageChanged { usage: DailyUsage },

    #[serde(rename = "bonus_balance")]
    BonusBalanceChanged { balance: u32 },

    /// A durable store operation failed; in-memory state is still authoritative
    #[serde(rename = "persistence_failed")]
    PersistenceFailed { key: String, error: String },
}

/// Broadcast sender shared by every engine component
pub type EventSender = broadcast::Sender<EngineEvent>;

/// Send an event, ignoring the case where nobody is listening
pub(crate) fn emit(tx: &EventSender, event: EngineEvent) {
    let _ = tx.send(event);
}
