//! # OpenAI Collaborator Client
//!
//! One reqwest-backed client implementing all three collaborator traits
//! against the OpenAI HTTP API: Whisper transcription (multipart upload),
//! chat completions, and speech synthesis. Constructed once at startup and
//! shared behind `Arc`; no global singleton.

use crate::config::OpenAiConfig;
use crate::openai::{ChatCompletion, CollaboratorError, SpeechToText, TextToSpeech};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Client for the OpenAI speech and chat endpoints.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key)
    }

    /// Turn a non-success response into a `CollaboratorError::Api`,
    /// preserving the status and body for the logs.
    async fn api_error(response: reqwest::Response) -> CollaboratorError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!(status, body = %body, "OpenAI API returned an error");
        CollaboratorError::Api { status, body }
    }
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, CollaboratorError> {
        debug!(audio_bytes = audio.len(), "starting transcription request");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| CollaboratorError::Malformed(e.to_string()))?,
            )
            .text("model", self.config.transcription_model.clone());

        let response = self
            .client
            .post(TRANSCRIPTION_URL)
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let result: TranscriptionResponse = response.json().await?;
        debug!(transcript_chars = result.text.len(), "transcription complete");
        Ok(result.text)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
    ) -> Result<String, CollaboratorError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                CollaboratorError::Malformed("completion response contained no choices".to_string())
            })?;

        debug!(reply_chars = reply.len(), "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl TextToSpeech for OpenAiClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CollaboratorError> {
        let request = SpeechRequest {
            model: &self.config.tts_model,
            input: text,
            voice: &self.config.tts_voice,
        };

        let response = self
            .client
            .post(SPEECH_URL)
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let audio = response.bytes().await?;
        debug!(audio_bytes = audio.len(), "speech synthesis complete");
        Ok(audio.to_vec())
    }
}
