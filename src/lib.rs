//! # a3s-session
//!
//! Agent session, command approval, and usage quota engine for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-session` holds the conversational state of a coding agent: the live
//! session and its bounded history, running token and cost statistics, a
//! pending-command approval state machine that pauses the agent loop before
//! side-effecting actions, and a daily message quota with bonus credits.
//! Everything is persisted through a pluggable key-value store.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_session::{CommandOutcome, Decision, Message, SessionEngine};
//!
//! # async fn example() -> a3s_session::Result<()> {
//! let engine = SessionEngine::in_memory().await?;
//!
//! engine.append_message(Message::user("Run the test suite")).await?;
//!
//! // Agent loop: gate the tool call and wait for the operator
//! let pending = engine.request_approval("call_1", "cargo test", None).await?;
//! let id = pending.id().to_string();
//!
//! // UI: approve it
//! engine.approve(&id).await?;
//!
//! if pending.wait_for_decision().await? == Decision::Approved {
//!     engine.mark_executing(&id).await?;
//!     engine.complete(&id, CommandOutcome::Success("ok".into())).await?;
//! }
//!
//! engine.record_usage(1_200, 300, None).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage
//!
//! - **memory**: In-memory store for testing and ephemeral sessions
//! - **file**: One JSON file per record in a state directory
//!
//! ## Architecture
//!
//! - **SessionEngine**: injectable facade wiring every component
//! - **SessionManager**: live session, archive history, statistics
//! - **ApprovalManager**: pending commands and agent pause state
//! - **UsageQuotaLedger**: daily counter and bonus balance
//! - **StateStore** trait: durable backend behind a single-writer `Persistence`
//! - **EngineEvent**: change notifications for UI rendering

pub mod approval;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;
pub mod pricing;
pub mod quota;
pub mod session;
pub mod state;
pub mod stats;
pub mod types;

// Re-export core types
pub use approval::{ApprovalManager, Decision, PendingApproval};
pub use config::{EngineConfig, ModelCost, ModelEntry, ModelLimit, StorageBackend};
pub use engine::{EngineSnapshot, SessionEngine};
pub use error::{Result, SessionError};
pub use events::{EngineEvent, EventSender};
pub use policy::{ApprovalPolicy, ToolCategory};
pub use pricing::{ModelInfo, ModelPricing, PricingTable};
pub use quota::{Clock, LocalClock, ManualClock, QuotaDecision, UsageQuotaLedger};
pub use session::{DeleteOutcome, LastActiveSession, SessionManager};
pub use state::{FileStateStore, MemoryStateStore, Persistence, StateStore};
pub use stats::SessionStatsEngine;
pub use types::{
    AgentPauseState, BonusLedger, CommandOutcome, CommandStatus, DailyUsage, Message,
    PendingCommand, Role, Session, SessionStats,
};
