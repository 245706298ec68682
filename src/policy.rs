//! Approval policy
//!
//! Decides whether a tool call must go through the approval state machine
//! before it runs. Read-only tools pass straight through; anything that
//! can cause side effects (including unknown tools) is gated.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tool category for determining approval requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolCategory {
    /// read, glob, ls, grep - never gated
    ReadOnly,
    /// bash, write, edit - gated when the policy is enabled
    SideEffecting,
}

impl ToolCategory {
    /// Classify a tool by its name
    pub fn from_tool_name(tool_name: &str) -> Self {
        match tool_name {
            "read" | "read_file" | "glob" | "ls" | "list_files" | "grep" | "search" => {
                ToolCategory::ReadOnly
            }
            _ => ToolCategory::SideEffecting,
        }
    }
}

/// Which tool calls require operator approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalPolicy {
    /// When false every tool call runs without approval
    pub enabled: bool,

    /// Tools that never need approval
    pub auto_approve_tools: HashSet<String>,

    /// Tools that always need approval, even if read-only
    pub require_approval_tools: HashSet<String>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_approve_tools: HashSet::new(),
            require_approval_tools: HashSet::new(),
        }
    }
}

impl ApprovalPolicy {
    /// A policy that never gates anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn with_auto_approve_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.auto_approve_tools = tools.into_iter().collect();
        self
    }

    pub fn with_require_approval_tools(mut self, tools: impl IntoIterator<Item = String>) -> Self {
        self.require_approval_tools = tools.into_iter().collect();
        self
    }

    /// Check if a tool call requires approval
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.require_approval_tools.contains(tool_name) {
            return true;
        }
        if self.auto_approve_tools.contains(tool_name) {
            return false;
        }
        ToolCategory::from_tool_name(tool_name) == ToolCategory::SideEffecting
    }
}
