//! C3: merges streamed `tool_calls` deltas into complete call objects.

use serde::Deserialize;
use tracing::warn;

use crate::types::{FunctionCall, ToolCall};

/// One `tool_calls[i]` delta as it arrives over SSE. Every field but
/// `index` is optional since a single delta typically carries only a
/// fragment (e.g. a few characters of `arguments`).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: FunctionDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct PendingCall {
    id: String,
    call_type: Option<String>,
    name: String,
    arguments: String,
    dispatched: bool,
}

impl PendingCall {
    fn is_dispatchable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

/// Accumulates tool-call deltas across a single streaming completion.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: Vec<Option<PendingCall>>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta in. Returns the call if this delta is what made the
    /// entry dispatchable for the first time (id and function.name both
    /// non-empty): callers publish that as an ACTION(IN_PROGRESS) event
    /// exactly once.
    pub fn add_delta(&mut self, delta: ToolCallDelta) -> Option<ToolCall> {
        if self.entries.len() <= delta.index {
            self.entries.resize_with(delta.index + 1, || None);
        }

        let entry = self.entries[delta.index].get_or_insert_with(PendingCall::default);
        let was_dispatchable = entry.is_dispatchable();

        if let Some(id) = delta.id {
            if !id.is_empty() {
                entry.id = id;
            }
        }
        if let Some(ty) = delta.call_type {
            if !ty.is_empty() {
                if entry.call_type.as_deref().is_some_and(|existing| existing != ty) {
                    warn!(index = delta.index, old = ?entry.call_type, new = %ty, "conflicting tool_call type in stream, last write wins");
                }
                entry.call_type = Some(ty);
            }
        }
        if let Some(name) = delta.function.name {
            entry.name.push_str(&name);
        }
        if let Some(arguments) = delta.function.arguments {
            entry.arguments.push_str(&arguments);
        }

        if !was_dispatchable && entry.is_dispatchable() {
            entry.dispatched = true;
            Some(ToolCall {
                id: entry.id.clone(),
                call_type: entry.call_type.clone().unwrap_or_else(|| "function".to_string()),
                function: FunctionCall {
                    name: entry.name.clone(),
                    arguments: entry.arguments.clone(),
                },
            })
        } else {
            None
        }
    }

    /// Drain the accumulator at end of stream. Entries that never became
    /// dispatchable are dropped with a warning; the rest are returned in
    /// increasing index order with their final (possibly further-extended)
    /// argument strings.
    pub fn finish(self) -> Vec<ToolCall> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.into_iter().enumerate() {
            match entry {
                Some(entry) if entry.is_dispatchable() => out.push(ToolCall {
                    id: entry.id,
                    call_type: entry.call_type.unwrap_or_else(|| "function".to_string()),
                    function: FunctionCall {
                        name: entry.name,
                        arguments: entry.arguments,
                    },
                }),
                Some(_) => warn!(index, "incomplete tool_call delta at end of stream, skipping"),
                None => {}
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: usize, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            call_type: None,
            function: FunctionDelta {
                name: name.map(str::to_string),
                arguments: args.map(str::to_string),
            },
        }
    }

    #[test]
    fn single_delta_with_id_and_name_is_immediately_dispatchable() {
        let mut acc = ToolCallAccumulator::new();
        let dispatched = acc.add_delta(delta(0, Some("c1"), Some("get_wifi"), Some("{}")));
        assert!(dispatched.is_some());
        let call = dispatched.unwrap();
        assert_eq!(call.id, "c1");
        assert_eq!(call.function.name, "get_wifi");
    }

    #[test]
    fn fragmented_name_only_dispatches_once_complete() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc
            .add_delta(delta(0, Some("c1"), Some("get_"), None))
            .is_none());
        let dispatched = acc.add_delta(delta(0, None, Some("wifi"), None));
        assert!(dispatched.is_some());
        assert_eq!(dispatched.unwrap().function.name, "get_wifi");
    }

    #[test]
    fn dispatch_fires_exactly_once() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc
            .add_delta(delta(0, Some("c1"), Some("tool"), Some("{")))
            .is_some());
        // further argument fragments must not re-fire the dispatch event
        assert!(acc.add_delta(delta(0, None, None, Some("}"))).is_none());
    }

    #[test]
    fn arguments_are_concatenated_in_arrival_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.add_delta(delta(0, Some("c1"), Some("t"), Some("{\"a\":")));
        acc.add_delta(delta(0, None, None, Some("1}")));
        let calls = acc.finish();
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
    }

    #[test]
    fn sparse_indices_fill_skeletons() {
        let mut acc = ToolCallAccumulator::new();
        acc.add_delta(delta(2, Some("c3"), Some("third"), Some("{}")));
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "third");
    }

    #[test]
    fn incomplete_entries_are_skipped_at_finish() {
        let mut acc = ToolCallAccumulator::new();
        acc.add_delta(delta(0, Some("c1"), Some("whole"), Some("{}")));
        acc.add_delta(delta(1, None, Some("orphan_name_no_id"), None));
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "whole");
    }

    #[test]
    fn entries_returned_in_increasing_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.add_delta(delta(1, Some("c2"), Some("second"), Some("{}")));
        acc.add_delta(delta(0, Some("c1"), Some("first"), Some("{}")));
        let calls = acc.finish();
        assert_eq!(calls[0].function.name, "first");
        assert_eq!(calls[1].function.name, "second");
    }

    #[test]
    fn empty_accumulator_is_empty() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.finish().is_empty());
    }
}
