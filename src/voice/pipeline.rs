//! # Voice Turn Pipeline
//!
//! Converts one inbound audio blob into one outbound audio blob:
//! transcribe the child's speech, ask the chat collaborator for a tutoring
//! reply under the profile-derived system instruction, then synthesize that
//! reply back into audio.
//!
//! The pipeline holds no per-turn state. Each invocation makes at most one
//! call per stage, never retries, and fails as a whole on the first stage
//! error. Ordering and concurrency are the session actor's responsibility;
//! this type is safe to share behind `Arc` across sessions.

use crate::error::{PipelineError, PipelineStage};
use crate::openai::{ChatCompletion, SpeechToText, TextToSpeech};
use crate::prompts::build_system_instruction;
use crate::voice::session::UserProfile;

use std::sync::Arc;
use tracing::{debug, info};

/// The transcribe → complete → synthesize pipeline for voice turns.
///
/// Collaborators are injected at construction so tests can substitute
/// doubles; production wires all three to one [`crate::openai::OpenAiClient`].
pub struct VoicePipeline {
    transcriber: Arc<dyn SpeechToText>,
    chat: Arc<dyn ChatCompletion>,
    synthesizer: Arc<dyn TextToSpeech>,
}

impl VoicePipeline {
    pub fn new(
        transcriber: Arc<dyn SpeechToText>,
        chat: Arc<dyn ChatCompletion>,
        synthesizer: Arc<dyn TextToSpeech>,
    ) -> Self {
        Self {
            transcriber,
            chat,
            synthesizer,
        }
    }

    /// Process one voice turn.
    ///
    /// ## Stages:
    /// 1. Transcribe the audio to text (input must be non-empty)
    /// 2. Build the system instruction from the session profile
    /// 3. Request a completion with exactly those two messages
    /// 4. Synthesize the reply text into audio
    ///
    /// ## Errors:
    /// The first failing collaborator call aborts the turn with a
    /// [`PipelineError`] naming the stage. Later stages are not attempted
    /// and no partial audio is ever produced.
    pub async fn process(
        &self,
        audio: &[u8],
        profile: &UserProfile,
    ) -> Result<Vec<u8>, PipelineError> {
        if audio.is_empty() {
            return Err(PipelineError::new(
                PipelineStage::Transcription,
                crate::openai::CollaboratorError::Malformed(
                    "audio input is empty".to_string(),
                ),
            ));
        }

        let transcript = self
            .transcriber
            .transcribe(audio)
            .await
            .map_err(|e| PipelineError::new(PipelineStage::Transcription, e))?;
        debug!(transcript = %transcript, "turn transcribed");

        let system_instruction = build_system_instruction(profile);

        let reply = self
            .chat
            .complete(&system_instruction, &transcript)
            .await
            .map_err(|e| PipelineError::new(PipelineStage::Completion, e))?;
        debug!(reply_chars = reply.len(), "tutoring reply generated");

        let audio_out = self
            .synthesizer
            .synthesize(&reply)
            .await
            .map_err(|e| PipelineError::new(PipelineStage::Synthesis, e))?;

        info!(
            audio_in_bytes = audio.len(),
            audio_out_bytes = audio_out.len(),
            "voice turn completed"
        );
        Ok(audio_out)
    }
}
