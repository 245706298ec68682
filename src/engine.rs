//! Session engine
//!
//! Owns one instance of every component and wires them to a shared
//! persistence layer and event channel. Hosts share it as
//! `Arc<SessionEngine>` between the agent loop and the UI.

use crate::approval::{ApprovalManager, PendingApproval};
use crate::config::{EngineConfig, StorageBackend};
use crate::error::{Result, SessionError};
use crate::events::{EngineEvent, EventSender};
use crate::pricing::PricingTable;
use crate::quota::{Clock, LocalClock, UsageQuotaLedger};
use crate::session::{DeleteOutcome, SessionManager};
use crate::state::{FileStateStore, MemoryStateStore, Persistence, StateStore};
use crate::types::{
    AgentPauseState, CommandOutcome, DailyUsage, Message, PendingCommand, Role, Session,
    SessionStats,
};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

const RESET_REASON: &str = "conversation reset";

/// Everything a UI needs to render the current engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: Session,
    pub stats: SessionStats,
    pub pending_commands: Vec<PendingCommand>,
    pub pause: AgentPauseState,
    /// Archived sessions, most recent first
    pub history: Vec<Session>,
    pub daily_usage: DailyUsage,
    pub bonus_balance: u32,
}

/// Agent session and command approval engine
pub struct SessionEngine {
    config: EngineConfig,
    pricing: Arc<PricingTable>,
    persistence: Arc<Persistence>,
    sessions: SessionManager,
    approvals: ApprovalManager,
    quota: UsageQuotaLedger,
    event_tx: EventSender,
    /// Serializes conversation changes against gated submits
    lifecycle: Mutex<()>,
}

impl SessionEngine {
    /// Open an engine with the store selected by `config.storage_backend`
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn StateStore> = match config.storage_backend {
            StorageBackend::Memory => Arc::new(MemoryStateStore::new()),
            StorageBackend::File => {
                let dir = config.state_dir.clone().ok_or_else(|| {
                    SessionError::Config("stateDir is required for the file storage backend".to_string())
                })?;
                Arc::new(FileStateStore::new(dir))
            }
        };
        Self::with_store(config, store).await
    }

    /// In-memory engine with default configuration
    pub async fn in_memory() -> Result<Self> {
        Self::open(EngineConfig::in_memory()).await
    }

    pub async fn with_store(config: EngineConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(LocalClock)).await
    }

    /// Build an engine with an injected store and calendar clock
    pub async fn with_clock(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let pricing = Arc::new(config.pricing_table());
        let backend = store.backend_name().to_string();
        let persistence = Arc::new(Persistence::new(store, event_tx.clone()));

        let sessions = SessionManager::load(
            &config,
            pricing.clone(),
            persistence.clone(),
            event_tx.clone(),
        )
        .await;
        let quota = UsageQuotaLedger::load(
            persistence.clone(),
            clock,
            config.daily_message_limit,
            event_tx.clone(),
        )
        .await;
        let approvals = ApprovalManager::new(config.approval.clone(), event_tx.clone());

        tracing::info!(
            backend = %backend,
            history_limit = config.history_limit,
            daily_message_limit = config.daily_message_limit,
            models = pricing.len(),
            "Session engine opened"
        );

        Ok(Self {
            config,
            pricing,
            persistence,
            sessions,
            approvals,
            quota,
            event_tx,
            lifecycle: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn approvals(&self) -> &ApprovalManager {
        &self.approvals
    }

    pub fn quota(&self) -> &UsageQuotaLedger {
        &self.quota
    }

    pub fn backend_name(&self) -> &str {
        self.persistence.backend_name()
    }

    // ========================================================================
    // Change notification
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Stream of engine events; lagged events are skipped
    pub fn events(&self) -> BoxStream<'static, EngineEvent> {
        BroadcastStream::new(self.event_tx.subscribe())
            .filter_map(|item| {
                future::ready(match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event subscriber lagged");
                        None
                    }
                })
            })
            .boxed()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            session: self.sessions.live_session().await,
            stats: self.sessions.stats().await,
            pending_commands: self.approvals.pending_commands().await,
            pause: self.approvals.pause_state().await,
            history: self.sessions.history().await,
            daily_usage: self.quota.daily_usage().await,
            bonus_balance: self.quota.bonus_balance().await,
        }
    }

    /// Wait until every queued persistence write has been applied
    pub async fn flush(&self) {
        self.persistence.flush().await;
    }

    // ========================================================================
    // Conversation lifecycle
    // ========================================================================

    /// Archive the live session and start a new one, rejecting any pending command
    pub async fn start_new_conversation(&self) -> Result<String> {
        let _guard = self.lifecycle.lock().await;
        let id = self.sessions.start_new_conversation().await?;
        self.approvals.reset_pending(RESET_REASON).await;
        Ok(id)
    }

    /// Make an archived session live, rejecting any pending command
    ///
    /// Loading the session that is already live changes nothing.
    pub async fn load_session(&self, id: &str) -> Result<Session> {
        let _guard = self.lifecycle.lock().await;
        let already_live = self.sessions.live_id().await == id;
        let session = self.sessions.load_session(id).await?;
        if !already_live {
            self.approvals.reset_pending(RESET_REASON).await;
        }
        Ok(session)
    }

    /// Delete a session; deleting the live one also rejects pending commands
    pub async fn delete_session(&self, id: &str) -> Result<DeleteOutcome> {
        let _guard = self.lifecycle.lock().await;
        let outcome = self.sessions.delete_session(id).await?;
        if outcome.live_cleared {
            self.approvals.reset_pending(RESET_REASON).await;
        }
        Ok(outcome)
    }

    pub async fn clear_history(&self) -> Result<usize> {
        self.sessions.clear_history().await
    }

    pub async fn archive_session(&self) -> Result<Option<Session>> {
        self.sessions.archive_session().await
    }

    /// Append a message; assistant messages close an exchange and archive
    /// the live session when auto-archive is enabled
    pub async fn append_message(&self, message: Message) -> Result<()> {
        let closes_exchange = message.role == Role::Assistant;
        self.sessions.append_message(message).await?;
        if closes_exchange && self.config.auto_archive {
            self.sessions.archive_session().await?;
        }
        Ok(())
    }

    /// Record one LLM exchange; `None` prices it with the live session's model
    pub async fn record_usage(
        &self,
        prompt_tokens: u64,
        completion_tokens: u64,
        model_id: Option<&str>,
    ) -> SessionStats {
        self.sessions
            .record_usage(prompt_tokens, completion_tokens, model_id)
            .await
    }

    pub async fn stats(&self) -> SessionStats {
        self.sessions.stats().await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.sessions.messages().await
    }

    pub async fn history(&self) -> Vec<Session> {
        self.sessions.history().await
    }

    pub async fn live_session(&self) -> Session {
        self.sessions.live_session().await
    }

    /// Context window of the given model, or of the live session's model
    pub async fn context_window_for(&self, model_id: Option<&str>) -> u32 {
        match model_id {
            Some(model) => self.pricing.context_window_for(model),
            None => self.sessions.context_window().await,
        }
    }

    // ========================================================================
    // Command approval
    // ========================================================================

    pub async fn requires_approval(&self, tool_name: &str) -> bool {
        self.approvals.requires_approval(tool_name).await
    }

    /// Submit a gated command in the live session's working directory
    ///
    /// Never interleaves with a conversation change, so a command submitted
    /// for a new session is not rejected by that session's reset.
    pub async fn request_approval(
        &self,
        tool_call_id: &str,
        command: &str,
        reason: Option<String>,
    ) -> Result<PendingApproval> {
        let _guard = self.lifecycle.lock().await;
        let session_id = self.sessions.live_id().await;
        let working_directory = self.sessions.working_directory().await;
        self.approvals
            .submit_in_session(
                Some(session_id.as_str()),
                tool_call_id,
                command,
                working_directory,
                reason,
            )
            .await
    }

    pub async fn approve(&self, id: &str) -> Result<PendingCommand> {
        self.approvals.approve(id).await
    }

    pub async fn reject(&self, id: &str, reason: Option<String>) -> Result<PendingCommand> {
        self.approvals.reject(id, reason).await
    }

    pub async fn mark_executing(&self, id: &str) -> Result<PendingCommand> {
        self.approvals.mark_executing(id).await
    }

    pub async fn complete(&self, id: &str, outcome: CommandOutcome) -> Result<PendingCommand> {
        self.approvals.complete(id, outcome).await
    }

    pub async fn remove_command(&self, id: &str) -> Result<PendingCommand> {
        self.approvals.remove(id).await
    }

    pub async fn clear_resolved_commands(&self) -> usize {
        self.approvals.clear_all().await
    }

    pub async fn pending_commands(&self) -> Vec<PendingCommand> {
        self.approvals.pending_commands().await
    }

    pub async fn pause_state(&self) -> AgentPauseState {
        self.approvals.pause_state().await
    }
}
