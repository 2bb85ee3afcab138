//! Speech Adapters
//!
//! Opaque speech-to-text and text-to-speech conversions. The engine never
//! sees audio; handlers call these and feed the resulting text through the
//! normal submission pipeline.

use anyhow::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{AudioInput, CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, SpeechModel, Voice},
};
use async_trait::async_trait;
use tracing::info;

/// Contract for the speech collaborators: bytes to text and text to bytes.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribes recorded audio. An empty transcript is a valid result and
    /// is the caller's signal to reject the submission.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String>;

    /// Synthesizes speech for a prompt. Callers degrade to text-only when
    /// this fails.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// OpenAI-backed transcription and synthesis.
pub struct OpenAiSpeechService {
    client: Client<OpenAIConfig>,
    transcription_model: String,
    tts_model: String,
    tts_voice: String,
}

impl OpenAiSpeechService {
    pub fn new(
        config: OpenAIConfig,
        transcription_model: String,
        tts_model: String,
        tts_voice: String,
    ) -> Self {
        Self {
            client: Client::with_config(config),
            transcription_model,
            tts_model,
            tts_voice,
        }
    }

    fn speech_model(&self) -> SpeechModel {
        match self.tts_model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        }
    }

    fn voice(&self) -> Voice {
        match self.tts_voice.as_str() {
            "alloy" => Voice::Alloy,
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "shimmer" => Voice::Shimmer,
            _ => Voice::Nova,
        }
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeechService {
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String> {
        info!(bytes = audio.len(), filename, "Transcribing audio");
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(filename.to_string(), audio))
            .model(&self.transcription_model)
            .build()?;
        let response = self.client.audio().transcribe(request).await?;
        let transcript = response.text.trim().to_string();
        info!(chars = transcript.len(), "Transcription completed");
        Ok(transcript)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(self.speech_model())
            .voice(self.voice())
            .build()?;
        let response = self.client.audio().speech(request).await?;
        info!(bytes = response.bytes.len(), "Speech synthesis completed");
        Ok(response.bytes.to_vec())
    }
}
