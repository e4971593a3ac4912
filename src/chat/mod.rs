//! Chat orchestration: grounding a streaming conversation in retrieved
//! context.
//!
//! A turn moves through source check → optional web search → optional
//! knowledge-base retrieval → prompt assembly → provider streaming. The
//! provider's fragments are surfaced in arrival order and accumulated
//! into one assistant message.

mod orchestrator;

use crate::llm::ChatMessage;

pub use orchestrator::{ChatOptions, ChatOrchestrator, SOURCES_REQUIRED_MESSAGE};

/// A conversation transcript.
///
/// Streaming appends an empty assistant message first, then extends it
/// with each fragment as it arrives — never reordering, never buffering
/// the whole response.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Append the empty assistant message a streaming turn writes into.
    pub fn begin_assistant(&mut self) {
        self.messages.push(ChatMessage::assistant(""));
    }

    /// Append one streamed fragment to the current assistant message.
    pub fn append_fragment(&mut self, fragment: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == "assistant" {
                last.content.push_str(fragment);
                return;
            }
        }
        // No assistant message open yet; start one from this fragment.
        self.messages.push(ChatMessage::assistant(fragment));
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }
}
