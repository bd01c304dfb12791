//! # External AI Collaborators
//!
//! Trait seams for the three remote services the voice pipeline depends on:
//! speech-to-text, chat completion, and text-to-speech. The pipeline and the
//! HTTP handlers only ever see these traits, so tests substitute in-memory
//! doubles and production wires in [`OpenAiClient`].
//!
//! Each collaborator is a black box exchanging opaque byte blobs and UTF-8
//! text. Audio format compatibility is the collaborator's problem, not ours.

pub mod client;

pub use client::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single collaborator call.
///
/// Timeouts and connection resets surface as `Request`; a non-success HTTP
/// status (rate limit, auth, server error) as `Api`; a 2xx body we cannot
/// make sense of as `Malformed`.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Converts spoken audio into plain text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe an audio blob. The output language is whatever the
    /// collaborator heard; no assumption is made here.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, CollaboratorError>;
}

/// Produces a tutoring reply from a system instruction and the user's text.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Request a completion with exactly two messages: the system
    /// instruction and the user text. No history is threaded through.
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String, CollaboratorError>;
}

/// Converts reply text back into audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize speech for the given text, returning opaque audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError>;
}
