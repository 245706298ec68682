//! Pending command approval state machine
//!
//! Pauses the agent loop before side-effecting actions and resumes it only
//! after an explicit operator decision.
//!
//! ```text
//! pending ──approve──► approved ──mark_executing──► executing ──complete──► completed
//!    │
//!    └──reject──► rejected
//! ```
//!
//! The pause is taken by `submit` and released by `reject` or by `complete`
//! of the command holding it, so a UI keeps showing a paused agent until an
//! approved action has actually finished. Only one command may hold the
//! pause at a time.
//!
//! The agent loop awaits [`PendingApproval::wait_for_decision`], which is
//! backed by a one-shot channel per command id.

use crate::error::{Result, SessionError};
use crate::events::{emit, EngineEvent, EventSender};
use crate::policy::ApprovalPolicy;
use crate::types::{now_millis, AgentPauseState, CommandOutcome, CommandStatus, PendingCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{oneshot, RwLock};

/// Operator decision delivered to the waiting agent loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "decision")]
pub enum Decision {
    Approved,
    Rejected { reason: Option<String> },
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approved)
    }
}

#[derive(Debug)]
enum Resolution {
    Decided(Decision),
    Reset,
}

/// Handle returned by `submit`; the agent loop awaits the decision on it
#[derive(Debug)]
pub struct PendingApproval {
    id: String,
    tool_call_id: String,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingApproval {
    /// Pending command id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// Suspend until the command is approved or rejected
    ///
    /// Returns `SessionReset` if the conversation was reset while the
    /// command was pending (or the command was dropped without a decision).
    pub async fn wait_for_decision(self) -> Result<Decision> {
        match self.rx.await {
            Ok(Resolution::Decided(decision)) => Ok(decision),
            Ok(Resolution::Reset) | Err(_) => Err(SessionError::SessionReset(self.id)),
        }
    }
}

#[derive(Default)]
struct ApprovalState {
    /// Active set, in submission order
    commands: Vec<PendingCommand>,
    /// Decision channels for commands still in `pending`
    waiters: HashMap<String, oneshot::Sender<Resolution>>,
    pause: AgentPauseState,
    /// Command id holding the pause
    holder: Option<String>,
}

impl ApprovalState {
    fn find_mut(&mut self, id: &str) -> Result<&mut PendingCommand> {
        self.commands
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| SessionError::NotFound(format!("Command not found: {}", id)))
    }

    /// Move a command from `from` to `to`, leaving it untouched on mismatch
    fn transition(
        &mut self,
        id: &str,
        from: CommandStatus,
        to: CommandStatus,
        action: &str,
    ) -> Result<&mut PendingCommand> {
        let command = self.find_mut(id)?;
        if command.status != from {
            tracing::error!(
                command_id = %id,
                status = %command.status,
                action,
                "Invalid command transition"
            );
            return Err(SessionError::invalid_transition(id, command.status, action));
        }
        command.status = to;
        command.updated_at = now_millis();
        Ok(command)
    }

    fn hold_pause(&mut self, id: &str, tool_call_id: &str) {
        self.holder = Some(id.to_string());
        self.pause = AgentPauseState {
            agent_paused: true,
            paused_at_tool_call_id: Some(tool_call_id.to_string()),
        };
    }

    /// Returns true if the pause state changed
    fn release_pause(&mut self) -> bool {
        let was_paused = self.pause.agent_paused;
        self.holder = None;
        self.pause = AgentPauseState::default();
        was_paused
    }

    fn resolve_waiter(&mut self, id: &str, resolution: Resolution) {
        if let Some(tx) = self.waiters.remove(id) {
            let _ = tx.send(resolution);
        }
    }
}

/// Tracks in-flight tool-call requests and the agent pause state
pub struct ApprovalManager {
    policy: RwLock<ApprovalPolicy>,
    state: RwLock<ApprovalState>,
    event_tx: EventSender,
}

impl ApprovalManager {
    pub fn new(policy: ApprovalPolicy, event_tx: EventSender) -> Self {
        Self {
            policy: RwLock::new(policy),
            state: RwLock::new(ApprovalState::default()),
            event_tx,
        }
    }

    pub async fn policy(&self) -> ApprovalPolicy {
        self.policy.read().await.clone()
    }

    pub async fn set_policy(&self, policy: ApprovalPolicy) {
        *self.policy.write().await = policy;
    }

    /// Check if a tool call must be submitted for approval
    pub async fn requires_approval(&self, tool_name: &str) -> bool {
        self.policy.read().await.requires_approval(tool_name)
    }

    /// Register a gated action and pause the agent
    ///
    /// Fails with `AlreadyPaused` when a different tool call holds the
    /// pause. Resubmitting the same tool call while its previous command is
    /// still pending supersedes that command, which is rejected.
    pub async fn submit(
        &self,
        tool_call_id: &str,
        command: &str,
        working_directory: Option<PathBuf>,
        reason: Option<String>,
    ) -> Result<PendingApproval> {
        self.submit_in_session(None, tool_call_id, command, working_directory, reason)
            .await
    }

    /// `submit`, recording the live session the command belongs to
    pub async fn submit_in_session(
        &self,
        session_id: Option<&str>,
        tool_call_id: &str,
        command: &str,
        working_directory: Option<PathBuf>,
        reason: Option<String>,
    ) -> Result<PendingApproval> {
        let id = format!("cmd-{}", uuid::Uuid::new_v4());
        let mut state = self.state.write().await;

        if let Some(holder_id) = state.holder.clone() {
            let holder = state.find_mut(&holder_id)?;
            if holder.tool_call_id != tool_call_id || holder.status != CommandStatus::Pending {
                let held_by = holder.tool_call_id.clone();
                tracing::warn!(
                    held_by = %held_by,
                    tool_call_id,
                    "Submit rejected, agent already paused"
                );
                return Err(SessionError::AlreadyPaused {
                    held_by,
                    tool_call_id: tool_call_id.to_string(),
                });
            }

            let superseded = format!("superseded by {}", id);
            holder.status = CommandStatus::Rejected;
            holder.error = Some(superseded.clone());
            holder.updated_at = now_millis();
            let old_tool_call = holder.tool_call_id.clone();

            state.resolve_waiter(
                &holder_id,
                Resolution::Decided(Decision::Rejected {
                    reason: Some(superseded),
                }),
            );
            tracing::debug!(command_id = %holder_id, new_id = %id, "Pending command superseded");
            emit(
                &self.event_tx,
                EngineEvent::CommandStatusChanged {
                    id: holder_id,
                    tool_call_id: old_tool_call,
                    status: CommandStatus::Rejected,
                },
            );
        }

        let now = now_millis();
        state.commands.push(PendingCommand {
            id: id.clone(),
            tool_call_id: tool_call_id.to_string(),
            session_id: session_id.map(str::to_string),
            command: command.to_string(),
            working_directory,
            reason,
            status: CommandStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        });

        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id.clone(), tx);
        state.hold_pause(&id, tool_call_id);

        tracing::info!(command_id = %id, tool_call_id, command, "Command awaiting approval");
        emit(
            &self.event_tx,
            EngineEvent::CommandSubmitted {
                id: id.clone(),
                tool_call_id: tool_call_id.to_string(),
                command: command.to_string(),
            },
        );
        emit(
            &self.event_tx,
            EngineEvent::PauseChanged {
                state: state.pause.clone(),
            },
        );

        Ok(PendingApproval {
            id,
            tool_call_id: tool_call_id.to_string(),
            rx,
        })
    }

    /// `pending → approved`; the agent stays paused until `complete`
    pub async fn approve(&self, id: &str) -> Result<PendingCommand> {
        let mut state = self.state.write().await;
        let command = state
            .transition(id, CommandStatus::Pending, CommandStatus::Approved, "approve")?
            .clone();
        state.resolve_waiter(id, Resolution::Decided(Decision::Approved));

        tracing::info!(command_id = %id, "Command approved");
        self.emit_status(&command);
        Ok(command)
    }

    /// `pending → rejected`; releases the pause
    pub async fn reject(&self, id: &str, reason: Option<String>) -> Result<PendingCommand> {
        let mut state = self.state.write().await;
        let command = state.transition(id, CommandStatus::Pending, CommandStatus::Rejected, "reject")?;
        command.error = reason.clone();
        let command = command.clone();

        state.resolve_waiter(id, Resolution::Decided(Decision::Rejected { reason }));
        let changed = state.release_pause();

        tracing::info!(command_id = %id, "Command rejected");
        self.emit_status(&command);
        if changed {
            self.emit_pause(&state.pause);
        }
        Ok(command)
    }

    /// `approved → executing`
    pub async fn mark_executing(&self, id: &str) -> Result<PendingCommand> {
        let mut state = self.state.write().await;
        let command = state
            .transition(id, CommandStatus::Approved, CommandStatus::Executing, "mark executing")?
            .clone();

        tracing::debug!(command_id = %id, "Command executing");
        self.emit_status(&command);
        Ok(command)
    }

    /// `executing → completed`; releases the pause if this command held it
    pub async fn complete(&self, id: &str, outcome: CommandOutcome) -> Result<PendingCommand> {
        let mut state = self.state.write().await;
        let command = state.transition(id, CommandStatus::Executing, CommandStatus::Completed, "complete")?;
        let success = matches!(outcome, CommandOutcome::Success(_));
        match outcome {
            CommandOutcome::Success(output) => command.result = Some(output),
            CommandOutcome::Failure(error) => command.error = Some(error),
        }
        let command = command.clone();

        let changed = if state.holder.as_deref() == Some(id) {
            state.release_pause()
        } else {
            false
        };

        tracing::info!(command_id = %id, success, "Command completed");
        self.emit_status(&command);
        if changed {
            self.emit_pause(&state.pause);
        }
        Ok(command)
    }

    /// Drop a resolved command from the active set
    pub async fn remove(&self, id: &str) -> Result<PendingCommand> {
        let mut state = self.state.write().await;
        let index = state
            .commands
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| SessionError::NotFound(format!("Command not found: {}", id)))?;

        let status = state.commands[index].status;
        if !status.is_resolved() {
            tracing::error!(command_id = %id, status = %status, "Cannot remove unresolved command");
            return Err(SessionError::invalid_transition(id, status, "remove"));
        }

        let command = state.commands.remove(index);
        emit(
            &self.event_tx,
            EngineEvent::CommandsRemoved {
                ids: vec![command.id.clone()],
            },
        );
        Ok(command)
    }

    /// Drop every resolved command; unresolved ones stay. Returns the count removed.
    pub async fn clear_all(&self) -> usize {
        let mut state = self.state.write().await;
        let (resolved, active): (Vec<_>, Vec<_>) = state
            .commands
            .drain(..)
            .partition(|c| c.status.is_resolved());
        state.commands = active;

        if !resolved.is_empty() {
            emit(
                &self.event_tx,
                EngineEvent::CommandsRemoved {
                    ids: resolved.iter().map(|c| c.id.clone()).collect(),
                },
            );
        }
        resolved.len()
    }

    /// Reject every pending command because the conversation was reset
    ///
    /// Waiters are unblocked with `SessionReset` and the pause is released
    /// if a reset command held it. Approved or executing commands stay in
    /// the active set, still holding the pause, so their completion can be
    /// recorded. Returns the ids that were reset.
    pub async fn reset_pending(&self, reason: &str) -> Vec<String> {
        let mut state = self.state.write().await;
        let now = now_millis();
        let mut reset = Vec::new();

        for command in state.commands.iter_mut() {
            if command.status == CommandStatus::Pending {
                command.status = CommandStatus::Rejected;
                command.error = Some(reason.to_string());
                command.updated_at = now;
                reset.push((command.id.clone(), command.tool_call_id.clone()));
            }
        }

        for (id, tool_call_id) in &reset {
            state.resolve_waiter(id, Resolution::Reset);
            emit(
                &self.event_tx,
                EngineEvent::CommandStatusChanged {
                    id: id.clone(),
                    tool_call_id: tool_call_id.clone(),
                    status: CommandStatus::Rejected,
                },
            );
        }

        // An approved or executing holder keeps the pause until `complete`
        let holder_reset = state
            .holder
            .as_deref()
            .is_some_and(|holder| reset.iter().any(|(id, _)| id == holder));
        if holder_reset && state.release_pause() {
            self.emit_pause(&state.pause);
        }
        if !reset.is_empty() {
            tracing::info!(count = reset.len(), reason, "Pending commands reset");
        }
        reset.into_iter().map(|(id, _)| id).collect()
    }

    pub async fn get(&self, id: &str) -> Option<PendingCommand> {
        self.state
            .read()
            .await
            .commands
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Active set, in submission order
    pub async fn pending_commands(&self) -> Vec<PendingCommand> {
        self.state.read().await.commands.clone()
    }

    pub async fn pause_state(&self) -> AgentPauseState {
        self.state.read().await.pause.clone()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.pause.agent_paused
    }

    fn emit_status(&self, command: &PendingCommand) {
        emit(
            &self.event_tx,
            EngineEvent::CommandStatusChanged {
                id: command.id.clone(),
                tool_call_id: command.tool_call_id.clone(),
                status: command.status,
            },
        );
    }

    fn emit_pause(&self, pause: &AgentPauseState) {
        emit(
            &self.event_tx,
            EngineEvent::PauseChanged {
                state: pause.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;
    use tokio_test::{assert_pending, assert_ready};

    fn manager() -> ApprovalManager {
        let (tx, _) = broadcast::channel(100);
        ApprovalManager::new(ApprovalPolicy::default(), tx)
    }

    async fn submit(manager: &ApprovalManager, tool_call_id: &str) -> PendingApproval {
        manager
            .submit(tool_call_id, "cargo test", Some(PathBuf::from("/work")), None)
            .await
            .unwrap()
    }

    // ========================================================================
    // Pause lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_paused_exactly_between_submit_and_complete() {
        let manager = manager();
        assert!(!manager.is_paused().await);

        let pending = submit(&manager, "tc-1").await;
        let id = pending.id().to_string();
        assert!(manager.is_paused().await);
        assert_eq!(
            manager.pause_state().await.paused_at_tool_call_id.as_deref(),
            Some("tc-1")
        );

        manager.approve(&id).await.unwrap();
        assert!(manager.is_paused().await);
        assert_eq!(pending.wait_for_decision().await.unwrap(), Decision::Approved);

        manager.mark_executing(&id).await.unwrap();
        assert!(manager.is_paused().await);

        let done = manager
            .complete(&id, CommandOutcome::Success("ok".to_string()))
            .await
            .unwrap();
        assert_eq!(done.status, CommandStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("ok"));
        assert_eq!(manager.pause_state().await, AgentPauseState::default());
    }

    #[tokio::test]
    async fn test_reject_releases_pause() {
        let manager = manager();
        let pending = submit(&manager, "tc-1").await;
        let id = pending.id().to_string();

        let rejected = manager
            .reject(&id, Some("too dangerous".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, CommandStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some("too dangerous"));
        assert!(!manager.is_paused().await);
        assert!(manager.pause_state().await.paused_at_tool_call_id.is_none());

        assert_eq!(
            pending.wait_for_decision().await.unwrap(),
            Decision::Rejected {
                reason: Some("too dangerous".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_complete_with_failure_records_error() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();
        manager.approve(&id).await.unwrap();
        manager.mark_executing(&id).await.unwrap();

        let done = manager
            .complete(&id, CommandOutcome::Failure("exit 101".to_string()))
            .await
            .unwrap();
        assert_eq!(done.error.as_deref(), Some("exit 101"));
        assert!(done.result.is_none());
        assert!(!manager.is_paused().await);
    }

    // ========================================================================
    // Submit conflicts
    // ========================================================================

    #[tokio::test]
    async fn test_second_submit_already_paused() {
        let manager = manager();
        let _pending = submit(&manager, "tc-1").await;

        let err = manager
            .submit("tc-2", "rm -rf target", None, None)
            .await
            .err()
            .unwrap();
        match err {
            SessionError::AlreadyPaused {
                held_by,
                tool_call_id,
            } => {
                assert_eq!(held_by, "tc-1");
                assert_eq!(tool_call_id, "tc-2");
            }
            other => panic!("Expected AlreadyPaused, got {:?}", other),
        }
        assert_eq!(manager.pending_commands().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_blocked_while_approved_command_runs() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();
        manager.approve(&id).await.unwrap();

        assert!(manager.submit("tc-2", "ls", None, None).await.is_err());
        // Same tool call cannot resubmit once approved either
        assert!(manager.submit("tc-1", "ls", None, None).await.is_err());

        manager.mark_executing(&id).await.unwrap();
        manager
            .complete(&id, CommandOutcome::Success(String::new()))
            .await
            .unwrap();
        assert!(manager.submit("tc-2", "ls", None, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_resubmit_same_tool_call_supersedes() {
        let manager = manager();
        let first = submit(&manager, "tc-1").await;
        let first_id = first.id().to_string();

        let second = submit(&manager, "tc-1").await;
        assert_ne!(second.id(), first_id);
        assert_eq!(second.tool_call_id(), "tc-1");

        let old = manager.get(&first_id).await.unwrap();
        assert_eq!(old.status, CommandStatus::Rejected);
        assert!(old.error.unwrap().starts_with("superseded by"));

        match first.wait_for_decision().await.unwrap() {
            Decision::Rejected { reason } => assert!(reason.unwrap().contains(second.id())),
            other => panic!("Expected rejection, got {:?}", other),
        }
        assert!(manager.is_paused().await);
    }

    // ========================================================================
    // Invalid transitions
    // ========================================================================

    #[tokio::test]
    async fn test_invalid_transitions_leave_state_unchanged() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();

        let err = manager.mark_executing(&id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        let err = manager
            .complete(&id, CommandOutcome::Success(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert_eq!(manager.get(&id).await.unwrap().status, CommandStatus::Pending);

        manager.reject(&id, None).await.unwrap();
        assert!(matches!(
            manager.approve(&id).await.unwrap_err(),
            SessionError::InvalidTransition { .. }
        ));
        assert!(matches!(
            manager.reject(&id, None).await.unwrap_err(),
            SessionError::InvalidTransition { .. }
        ));
        assert_eq!(manager.get(&id).await.unwrap().status, CommandStatus::Rejected);
    }

    #[tokio::test]
    async fn test_no_backward_transition_after_complete() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();
        manager.approve(&id).await.unwrap();
        manager.mark_executing(&id).await.unwrap();
        manager
            .complete(&id, CommandOutcome::Success(String::new()))
            .await
            .unwrap();

        assert!(manager.mark_executing(&id).await.is_err());
        assert!(manager.approve(&id).await.is_err());
        assert!(manager
            .complete(&id, CommandOutcome::Success(String::new()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_command_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.approve("cmd-missing").await.unwrap_err(),
            SessionError::NotFound(_)
        ));
        assert!(matches!(
            manager.remove("cmd-missing").await.unwrap_err(),
            SessionError::NotFound(_)
        ));
    }

    // ========================================================================
    // Waiters
    // ========================================================================

    #[tokio::test]
    async fn test_waiter_blocks_until_decision() {
        let manager = manager();
        let pending = submit(&manager, "tc-1").await;
        let id = pending.id().to_string();

        let mut wait = tokio_test::task::spawn(pending.wait_for_decision());
        assert_pending!(wait.poll());

        manager.approve(&id).await.unwrap();
        assert!(wait.is_woken());
        let decision = assert_ready!(wait.poll()).unwrap();
        assert!(decision.is_approved());
    }

    #[tokio::test]
    async fn test_reset_unblocks_waiter_with_session_reset() {
        let manager = manager();
        let pending = submit(&manager, "tc-1").await;
        let id = pending.id().to_string();

        let waiter = tokio::spawn(pending.wait_for_decision());
        let reset = manager.reset_pending("conversation reset").await;
        assert_eq!(reset, vec![id.clone()]);

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::SessionReset(ref reset_id) if reset_id == &id));
        assert!(!manager.is_paused().await);
        assert_eq!(manager.get(&id).await.unwrap().status, CommandStatus::Rejected);
    }

    #[tokio::test]
    async fn test_reset_keeps_executing_commands() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();
        manager.approve(&id).await.unwrap();
        manager.mark_executing(&id).await.unwrap();

        assert!(manager.reset_pending("new conversation").await.is_empty());
        assert!(manager.is_paused().await);
        assert_eq!(
            manager.pause_state().await.paused_at_tool_call_id.as_deref(),
            Some("tc-1")
        );

        // No second gated action while the first is still running
        let err = manager.submit("tc-2", "ls", None, None).await.err().unwrap();
        assert!(matches!(err, SessionError::AlreadyPaused { ref held_by, .. } if held_by == "tc-1"));

        manager
            .complete(&id, CommandOutcome::Success("done".to_string()))
            .await
            .unwrap();
        assert!(!manager.is_paused().await);
        assert!(manager.submit("tc-2", "ls", None, None).await.is_ok());
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    #[tokio::test]
    async fn test_remove_only_resolved() {
        let manager = manager();
        let id = submit(&manager, "tc-1").await.id().to_string();

        assert!(matches!(
            manager.remove(&id).await.unwrap_err(),
            SessionError::InvalidTransition { .. }
        ));

        manager.reject(&id, None).await.unwrap();
        let removed = manager.remove(&id).await.unwrap();
        assert_eq!(removed.id, id);
        assert!(manager.pending_commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_keeps_unresolved_and_pause() {
        let manager = manager();
        let first = submit(&manager, "tc-1").await.id().to_string();
        manager.reject(&first, None).await.unwrap();
        let second = submit(&manager, "tc-2").await.id().to_string();

        assert_eq!(manager.clear_all().await, 1);
        let remaining = manager.pending_commands().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
        assert!(manager.is_paused().await);
    }

    // ========================================================================
    // Events and policy
    // ========================================================================

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let (tx, mut rx) = broadcast::channel(100);
        let manager = ApprovalManager::new(ApprovalPolicy::default(), tx);

        let id = submit(&manager, "tc-1").await.id().to_string();
        manager.reject(&id, None).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::CommandSubmitted { .. }));
        match rx.recv().await.unwrap() {
            EngineEvent::PauseChanged { state } => assert!(state.agent_paused),
            other => panic!("Expected PauseChanged, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            EngineEvent::CommandStatusChanged { status, .. } => {
                assert_eq!(status, CommandStatus::Rejected)
            }
            other => panic!("Expected CommandStatusChanged, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            EngineEvent::PauseChanged { state } => assert!(!state.agent_paused),
            other => panic!("Expected PauseChanged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_requires_approval_follows_policy() {
        let manager = manager();
        assert!(manager.requires_approval("bash").await);
        assert!(!manager.requires_approval("read").await);

        manager.set_policy(ApprovalPolicy::disabled()).await;
        assert!(!manager.requires_approval("bash").await);
        assert!(!manager.policy().await.enabled);
    }
}
