//! Conversational side-channel
//!
//! A thin stateful wrapper over a provider chat session, seeded with the
//! patient data and a fixed persona instruction. Provider failures never
//! terminate the handle: each failed call becomes a transcript entry
//! prefixed `"Error: "`, and the next call retries session setup if needed.

use clinsight_llm::{ChatError, ChatProvider, ChatSession};
use std::sync::Arc;
use tracing::warn;

/// Fixed persona instruction seeding every chat session.
pub const CHAT_PERSONA: &str =
    "You are a clinical assistant answering questions about the attached patient \
     report. Ground every answer in the provided patient data, flag uncertainty \
     explicitly, and never offer a diagnosis the data does not support.";

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The clinician using the chat
    User,
    /// The assistant (including error entries)
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    /// Who spoke
    pub role: ChatRole,
    /// The message text
    pub text: String,
}

impl ChatTurn {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// A live chat handle with its visible transcript.
///
/// Session setup is lazy: the provider session is opened on the first call
/// and re-attempted on later calls if setup failed.
pub struct ChatHandle {
    provider: Arc<dyn ChatProvider>,
    patient_data: String,
    session: Option<Box<dyn ChatSession>>,
    transcript: Vec<ChatTurn>,
}

impl ChatHandle {
    pub(crate) fn new(provider: Arc<dyn ChatProvider>, patient_data: String) -> Self {
        Self {
            provider,
            patient_data,
            session: None,
            transcript: Vec::new(),
        }
    }

    /// Produce the opening assistant message and record it.
    ///
    /// On failure the returned text (and transcript entry) is the error
    /// rendered with the `"Error: "` prefix.
    pub async fn initial_greeting(&mut self) -> String {
        let reply = match self.ensure_session().await {
            Ok(()) => match self.session.as_mut() {
                Some(session) => session.greeting().await,
                None => Err(ChatError("session unavailable".to_string())),
            },
            Err(e) => Err(e),
        };
        self.record_assistant(reply)
    }

    /// Send a user message and return the assistant reply.
    ///
    /// The user turn is always recorded; a provider failure records an
    /// `"Error: "` assistant turn and leaves the handle usable.
    pub async fn send_message(&mut self, message: &str) -> String {
        self.transcript.push(ChatTurn::user(message));
        let reply = match self.ensure_session().await {
            Ok(()) => match self.session.as_mut() {
                Some(session) => session.send(message).await,
                None => Err(ChatError("session unavailable".to_string())),
            },
            Err(e) => Err(e),
        };
        self.record_assistant(reply)
    }

    /// The full visible transcript, in order.
    #[inline]
    #[must_use]
    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    async fn ensure_session(&mut self) -> Result<(), ChatError> {
        if self.session.is_none() {
            let session = self
                .provider
                .start_session(&self.patient_data, CHAT_PERSONA)
                .await?;
            self.session = Some(session);
        }
        Ok(())
    }

    fn record_assistant(&mut self, reply: Result<String, ChatError>) -> String {
        let text = match reply {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "chat call failed");
                format!("Error: {e}")
            }
        };
        self.transcript.push(ChatTurn::assistant(text.clone()));
        text
    }
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle")
            .field("turns", &self.transcript.len())
            .field("session_open", &self.session.is_some())
            .finish_non_exhaustive()
    }
}
