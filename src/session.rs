//! Conversation session manager
//!
//! Owns the live message log, the bounded archive history and the live
//! session's statistics. History is kept most-recent first and persisted
//! under [`keys::HISTORY`]; the live session id is persisted under
//! [`keys::LAST_ACTIVE_SESSION`] so a restarted engine resumes it.

use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::events::{emit, EngineEvent, EventSender};
use crate::pricing::PricingTable;
use crate::state::{keys, Persistence};
use crate::stats::SessionStatsEngine;
use crate::types::{derive_title, now_millis, Message, Role, Session, SessionStats};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pointer to the session that was live when the engine last ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastActiveSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Result of [`SessionManager::delete_session`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The entry was present in history
    pub removed_from_history: bool,
    /// The id was the live session, which has been replaced by a fresh one
    pub live_cleared: bool,
}

struct SessionState {
    live: Session,
    stats: SessionStatsEngine,
    /// Archived sessions, most recent first
    history: Vec<Session>,
    default_model: String,
    allowed_folder: Option<PathBuf>,
    workspace_root: Option<PathBuf>,
    /// Live session changed since it was last archived or loaded
    dirty: bool,
}

impl SessionState {
    /// `allowedFolder` override, then workspace root, then none
    fn initial_working_directory(&self) -> Option<PathBuf> {
        self.allowed_folder
            .clone()
            .or_else(|| self.workspace_root.clone())
    }

    fn fresh_session(&self) -> Session {
        Session::new(self.default_model.clone(), self.initial_working_directory())
    }

    /// Whether switching away from the live session must archive it first
    fn needs_archive(&self) -> bool {
        !self.live.is_empty()
            && (self.dirty || !self.history.iter().any(|s| s.id == self.live.id))
    }

    /// Write the live session into history, returning the archived snapshot
    fn archive_live(&mut self, limit: usize) -> Session {
        self.dirty = false;
        let now = now_millis().max(self.live.updated_at);
        self.live.updated_at = now;
        self.live.total_tokens = self.stats.stats().total_tokens;
        self.live.total_cost = self.stats.stats().total_cost;

        let mut snapshot = self.live.clone();
        if let Some(index) = self.history.iter().position(|s| s.id == snapshot.id) {
            let existing = self.history.remove(index);
            snapshot.created_at = existing.created_at;
        }
        self.history.insert(0, snapshot.clone());
        evict(&mut self.history, limit);
        snapshot
    }
}

/// Drop least-recently-updated entries until the history fits the cap
fn evict(history: &mut Vec<Session>, limit: usize) {
    while history.len() > limit {
        // Ties go to the entry furthest from the front
        let oldest = history
            .iter()
            .enumerate()
            .rev()
            .min_by_key(|(_, s)| s.updated_at)
            .map(|(i, _)| i);
        match oldest {
            Some(index) => {
                let evicted = history.remove(index);
                tracing::debug!(session_id = %evicted.id, "Evicted session from history");
            }
            None => break,
        }
    }
}

/// Live conversation plus bounded archive history
pub struct SessionManager {
    state: RwLock<SessionState>,
    history_limit: usize,
    persistence: Arc<Persistence>,
    event_tx: EventSender,
}

impl SessionManager {
    /// Restore history and the last active session from persistence
    pub async fn load(
        config: &EngineConfig,
        pricing: Arc<PricingTable>,
        persistence: Arc<Persistence>,
        event_tx: EventSender,
    ) -> Self {
        let mut history: Vec<Session> = persistence.load(keys::HISTORY).await;
        history.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        evict(&mut history, config.history_limit);

        let last: LastActiveSession = persistence.load(keys::LAST_ACTIVE_SESSION).await;
        let resumed = last
            .session_id
            .as_deref()
            .and_then(|id| history.iter().find(|s| s.id == id))
            .cloned();

        let mut stats = SessionStatsEngine::new(pricing);
        let live = match resumed {
            Some(session) => {
                stats.restore_totals(
                    session.total_tokens,
                    session.total_cost,
                    session.message_count() as u64,
                );
                tracing::info!(session_id = %session.id, "Resumed last active session");
                session
            }
            None => Session::new(
                config.default_model.clone(),
                config
                    .allowed_folder
                    .clone()
                    .or_else(|| config.workspace_root.clone()),
            ),
        };

        let state = SessionState {
            live,
            stats,
            history,
            default_model: config.default_model.clone(),
            allowed_folder: config.allowed_folder.clone(),
            workspace_root: config.workspace_root.clone(),
            dirty: false,
        };

        Self {
            state: RwLock::new(state),
            history_limit: config.history_limit,
            persistence,
            event_tx,
        }
    }

    /// Archive the live session if it has unarchived changes and begin a
    /// fresh one
    ///
    /// Returns the new session id.
    pub async fn start_new_conversation(&self) -> Result<String> {
        let mut state = self.state.write().await;

        if state.needs_archive() {
            let archived = state.archive_live(self.history_limit);
            self.persistence.put(keys::HISTORY, &state.history)?;
            emit(
                &self.event_tx,
                EngineEvent::SessionArchived {
                    session_id: archived.id,
                },
            );
        }

        state.live = state.fresh_session();
        state.dirty = false;
        state.stats.reset_session_stats();
        let id = state.live.id.clone();
        self.save_last_active(&id)?;

        tracing::info!(
            session_id = %id,
            working_directory = ?state.live.working_directory,
            "Started new conversation"
        );
        emit(
            &self.event_tx,
            EngineEvent::SessionStarted {
                session_id: id.clone(),
            },
        );
        emit(
            &self.event_tx,
            EngineEvent::StatsUpdated {
                stats: state.stats.stats().clone(),
            },
        );
        Ok(id)
    }

    /// Append a message to the live session
    ///
    /// The first user message fixes the session title.
    pub async fn append_message(&self, message: Message) -> Result<()> {
        let mut state = self.state.write().await;

        if message.role == Role::User && !state.live.messages.iter().any(|m| m.role == Role::User) {
            state.live.title = derive_title(&message.content);
        }
        state.live.updated_at = now_millis().max(state.live.updated_at);

        let message_id = message.id.clone();
        state.live.messages.push(message);
        state.dirty = true;

        tracing::debug!(session_id = %state.live.id, message_id = %message_id, "Message appended");
        emit(
            &self.event_tx,
            EngineEvent::MessageAppended {
                session_id: state.live.id.clone(),
                message_id,
            },
        );
        Ok(())
    }

    /// Write the live session into history
    ///
    /// Archiving the same id again replaces the existing entry, keeps its
    /// original `createdAt` and moves it to the front. Returns `None` when
    /// the live session has no messages.
    pub async fn archive_session(&self) -> Result<Option<Session>> {
        let mut state = self.state.write().await;
        if state.live.is_empty() {
            return Ok(None);
        }

        let archived = state.archive_live(self.history_limit);
        self.persistence.put(keys::HISTORY, &state.history)?;
        self.save_last_active(&archived.id)?;

        tracing::info!(
            session_id = %archived.id,
            messages = archived.message_count(),
            history = state.history.len(),
            "Session archived"
        );
        emit(
            &self.event_tx,
            EngineEvent::SessionArchived {
                session_id: archived.id.clone(),
            },
        );
        Ok(Some(archived))
    }

    /// Make an archived session the live session
    ///
    /// The current live session is archived first if it has unarchived
    /// changes. Loading the id that is already live returns it unchanged.
    pub async fn load_session(&self, id: &str) -> Result<Session> {
        let mut state = self.state.write().await;

        if !state.history.iter().any(|s| s.id == id) {
            return Err(SessionError::NotFound(format!("Session not found: {}", id)));
        }

        if state.live.id == id {
            tracing::debug!(session_id = %id, "Session already live");
            return Ok(state.live.clone());
        }

        if state.needs_archive() {
            let archived = state.archive_live(self.history_limit);
            self.persistence.put(keys::HISTORY, &state.history)?;
            emit(
                &self.event_tx,
                EngineEvent::SessionArchived {
                    session_id: archived.id,
                },
            );
        }

        // The archive above may have evicted the requested entry
        let entry = state
            .history
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("Session not found: {}", id)))?;

        state.stats.restore_totals(
            entry.total_tokens,
            entry.total_cost,
            entry.message_count() as u64,
        );
        state.live = entry.clone();
        state.dirty = false;
        self.save_last_active(id)?;

        tracing::info!(session_id = %id, messages = entry.message_count(), "Session loaded");
        emit(
            &self.event_tx,
            EngineEvent::SessionLoaded {
                session_id: id.to_string(),
            },
        );
        emit(
            &self.event_tx,
            EngineEvent::StatsUpdated {
                stats: state.stats.stats().clone(),
            },
        );
        Ok(entry)
    }

    /// Remove a session from history
    ///
    /// Deleting the live session discards it without archiving and starts
    /// a fresh one in its place.
    pub async fn delete_session(&self, id: &str) -> Result<DeleteOutcome> {
        let mut state = self.state.write().await;

        let before = state.history.len();
        state.history.retain(|s| s.id != id);
        let removed_from_history = state.history.len() != before;
        let live_cleared = state.live.id == id;

        if !removed_from_history && !live_cleared {
            return Err(SessionError::NotFound(format!("Session not found: {}", id)));
        }

        if removed_from_history {
            self.persistence.put(keys::HISTORY, &state.history)?;
        }

        if live_cleared {
            state.live = state.fresh_session();
            state.dirty = false;
            state.stats.reset_session_stats();
            let new_id = state.live.id.clone();
            self.save_last_active(&new_id)?;
            emit(
                &self.event_tx,
                EngineEvent::SessionStarted { session_id: new_id },
            );
            emit(
                &self.event_tx,
                EngineEvent::StatsUpdated {
                    stats: state.stats.stats().clone(),
                },
            );
        }

        tracing::info!(session_id = %id, live_cleared, "Session deleted");
        emit(
            &self.event_tx,
            EngineEvent::SessionDeleted {
                session_id: id.to_string(),
            },
        );
        Ok(DeleteOutcome {
            removed_from_history,
            live_cleared,
        })
    }

    /// Empty the archive history; the live session is untouched
    pub async fn clear_history(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let count = state.history.len();
        state.history.clear();
        self.persistence.put(keys::HISTORY, &state.history)?;

        tracing::info!(count, "History cleared");
        emit(&self.event_tx, EngineEvent::HistoryCleared);
        Ok(count)
    }

    /// Record one exchange against the live session
    ///
    /// Uses the live session's model when `model_id` is `None`.
    pub async fn record_usage(
        &self,
        prompt_tokens: u64,
        completion_tokens: u64,
        model_id: Option<&str>,
    ) -> SessionStats {
        let mut state = self.state.write().await;
        let model = model_id
            .map(str::to_string)
            .unwrap_or_else(|| state.live.model.clone());

        state
            .stats
            .record_usage(prompt_tokens, completion_tokens, &model);
        let stats = state.stats.stats().clone();
        state.live.total_tokens = stats.total_tokens;
        state.live.total_cost = stats.total_cost;
        state.dirty = true;

        emit(
            &self.event_tx,
            EngineEvent::StatsUpdated {
                stats: stats.clone(),
            },
        );
        stats
    }

    pub async fn set_working_directory(&self, dir: Option<PathBuf>) {
        let mut state = self.state.write().await;
        tracing::debug!(session_id = %state.live.id, working_directory = ?dir, "Working directory set");
        state.live.working_directory = dir;
        state.dirty = true;
    }

    /// Folder restriction applied to sessions started from now on
    pub async fn set_allowed_folder(&self, folder: Option<PathBuf>) {
        self.state.write().await.allowed_folder = folder;
    }

    pub async fn set_workspace_root(&self, root: Option<PathBuf>) {
        self.state.write().await.workspace_root = root;
    }

    /// Change the live session's model
    pub async fn set_model(&self, model: impl Into<String>) {
        let mut state = self.state.write().await;
        state.live.model = model.into();
        state.dirty = true;
    }

    pub async fn live_session(&self) -> Session {
        self.state.read().await.live.clone()
    }

    pub async fn live_id(&self) -> String {
        self.state.read().await.live.id.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.live.messages.clone()
    }

    pub async fn working_directory(&self) -> Option<PathBuf> {
        self.state.read().await.live.working_directory.clone()
    }

    /// Archived sessions, most recent first
    pub async fn history(&self) -> Vec<Session> {
        self.state.read().await.history.clone()
    }

    pub async fn history_entry(&self, id: &str) -> Option<Session> {
        self.state
            .read()
            .await
            .history
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub async fn stats(&self) -> SessionStats {
        self.state.read().await.stats.stats().clone()
    }

    /// Context window of the live session's model
    pub async fn context_window(&self) -> u32 {
        let state = self.state.read().await;
        state.stats.context_window_for(&state.live.model)
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    fn save_last_active(&self, id: &str) -> Result<()> {
        self.persistence.put(
            keys::LAST_ACTIVE_SESSION,
            &LastActiveSession {
                session_id: Some(id.to_string()),
            },
        )
    }
}
