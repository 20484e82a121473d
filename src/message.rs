//! C6: conversation history and message construction.

use serde::{Deserialize, Serialize};
use tool_parser::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation turn. Invariants:
/// - `role == Tool` messages always carry a non-empty `tool_call_id`.
/// - `role == Assistant` messages may carry `tool_calls` but never a
///   `tool_call_id`.
/// - every other role carries neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Bounded conversation history. The oldest non-system message is evicted
/// once `capacity` is exceeded; the system message (if any) is pinned at
/// index 0 and never evicted.
#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    system: Option<Message>,
    turns: Vec<Message>,
}

const DEFAULT_CAPACITY: usize = 100;

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            system: None,
            turns: Vec::new(),
        }
    }

    pub fn set_system_message(&mut self, content: impl Into<String>) {
        self.system = Some(Message::system(content));
    }

    pub fn add(&mut self, message: Message) {
        if matches!(message.role, Role::System) {
            self.system = Some(message);
            return;
        }
        self.turns.push(message);
        while self.turns.len() > self.capacity {
            self.turns.remove(0);
        }
    }

    pub fn add_tool_result(&mut self, tool_call_id: impl Into<String>, content: impl Into<String>) {
        self.add(Message::tool_result(tool_call_id, content));
    }

    /// A tool call that the model produced but which failed to parse into a
    /// valid `ToolCall` (C1 sentinel). Appends the original `<tool_call>`
    /// snippet as an assistant message and a tool-role message carrying the
    /// parse error against the sentinel's own id, priming the model to
    /// recover on the next iteration.
    pub fn add_failed_tool_gen(&mut self, snippet: impl Into<String>, synthesized_call: &ToolCall, error_text: impl Into<String>) {
        self.add(Message::assistant(snippet));
        self.add(Message::tool_result(synthesized_call.id.clone(), error_text));
    }

    /// A tool call that parsed correctly but whose execution failed (the
    /// MCP server returned an error, or the process was unreachable). This
    /// is reported back as a tool-role message so the model can react to
    /// it inside the conversation, same as a successful result.
    pub fn add_failed_tool_execute(&mut self, tool_call_id: impl Into<String>, error_message: impl Into<String>) {
        self.add(Message::tool_result(tool_call_id, error_message));
    }

    pub fn len(&self) -> usize {
        self.turns.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The full message list in wire order: system message first (if
    /// set), then every turn in insertion order.
    pub fn format_for_wire(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.len());
        if let Some(system) = &self.system {
            out.push(system.clone());
        }
        out.extend(self.turns.iter().cloned());
        out
    }
}
