use crate::channel::{GenerationStage, Role, StopReason};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One visible transcript message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Partial state for one generation id.
///
/// The three text-lifecycle events can arrive in any order, so every field
/// starts unknown and fills in independently.
#[derive(Debug, Default)]
struct PendingGeneration {
    role: Option<Role>,
    content: Option<String>,
    stage: Option<GenerationStage>,
    stop_reason: Option<StopReason>,
}

impl PendingGeneration {
    /// An entry resolves once role, content, and stage are all known AND it is
    /// terminal: either the stage itself is FINAL, or a stop reason arrived.
    fn is_resolved(&self) -> bool {
        self.role.is_some()
            && self.content.is_some()
            && self.stage.is_some()
            && (self.stage == Some(GenerationStage::Final) || self.stop_reason.is_some())
    }
}

/// Reconciles out-of-order text-lifecycle events into an ordered transcript.
///
/// Deterministic under replay: the same calls in the same order always
/// produce the same message list. No clocks, no randomness, no I/O.
#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    pending: HashMap<String, PendingGeneration>,
    messages: Vec<Message>,
    /// Set when a resolved entry was INTERRUPTED; while set, resolved
    /// assistant entries are dropped until a different role comes through.
    interrupted: bool,
}

impl TranscriptReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all state for a fresh session.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.messages.clear();
        self.interrupted = false;
    }

    /// Insert an already-settled message, bypassing the pending cache.
    /// Used to seed the system prompt at session start.
    pub fn seed(&mut self, role: Role, content: &str) {
        self.merge(role, content.to_string());
    }

    pub fn on_text_start(&mut self, id: &str, role: Role, stage: GenerationStage) {
        let entry = self.pending.entry(id.to_string()).or_default();
        entry.role = Some(role);
        entry.stage = Some(stage);
        self.try_resolve(id);
    }

    /// Content fragments accumulate; repeated outputs for the same id join
    /// with a single space, like the cross-entry merge rule.
    pub fn on_text_output(&mut self, id: &str, role: Role, fragment: &str) {
        let entry = self.pending.entry(id.to_string()).or_default();
        entry.role = Some(role);
        match &mut entry.content {
            Some(existing) => {
                if !fragment.is_empty() {
                    if !existing.is_empty() {
                        existing.push(' ');
                    }
                    existing.push_str(fragment);
                }
            }
            None => entry.content = Some(fragment.to_string()),
        }
        self.try_resolve(id);
    }

    pub fn on_text_stop(&mut self, id: &str, stop_reason: StopReason) {
        let entry = self.pending.entry(id.to_string()).or_default();
        entry.stop_reason = Some(stop_reason);
        self.try_resolve(id);
    }

    /// The visible transcript so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn try_resolve(&mut self, id: &str) {
        let resolved = self
            .pending
            .get(id)
            .map(PendingGeneration::is_resolved)
            .unwrap_or(false);
        if !resolved {
            return;
        }

        let Some(entry) = self.pending.remove(id) else {
            return;
        };
        let (Some(role), Some(content)) = (entry.role, entry.content) else {
            return;
        };

        // A barge-in contributes no content; it only arms suppression.
        if entry.stop_reason == Some(StopReason::Interrupted) {
            self.interrupted = true;
            return;
        }

        if self.interrupted {
            if role == Role::Assistant {
                return;
            }
            self.interrupted = false;
        }

        self.merge(role, content);
    }

    /// Merge a resolved entry into the message list: consecutive same-role
    /// entries concatenate with a single space, a role change always starts
    /// a new message.
    fn merge(&mut self, role: Role, content: String) {
        match self.messages.last_mut() {
            Some(last) if last.role == role => {
                if !content.is_empty() {
                    if !last.content.is_empty() {
                        last.content.push(' ');
                    }
                    last.content.push_str(&content);
                }
            }
            _ => self.messages.push(Message { role, content }),
        }
    }
}
