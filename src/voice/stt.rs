//! Speech-to-text (STT) processing

use secrecy::{ExposeSecret, SecretString};

use crate::config::{SpeechConfig, SpeechProvider};
use crate::voice::SAMPLE_RATE;
use crate::{Error, Result};

/// Response from the Azure short-audio recognition API
#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AzureRecognition {
    recognition_status: String,
    #[serde(default)]
    display_text: String,
}

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: SecretString,
    provider: SpeechProvider,
    url: String,
    model: String,
}

impl SpeechToText {
    /// Create an STT instance for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the key or region is missing
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("speech API key required (SPEECH_API_KEY)".to_string()))?;

        match config.provider {
            SpeechProvider::Azure => {
                let region = config.region.as_deref().filter(|r| !r.is_empty()).ok_or_else(|| {
                    Error::Config("speech region required (SPEECH_SERVICE_REGION)".to_string())
                })?;
                Ok(Self::new_azure(api_key, region, &config.language))
            }
            SpeechProvider::OpenAI => Ok(Self::new_whisper(api_key, "whisper-1".to_string())),
        }
    }

    /// Create an STT instance using Azure Speech
    #[must_use]
    pub fn new_azure(api_key: SecretString, region: &str, language: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            provider: SpeechProvider::Azure,
            url: azure_stt_url(region, language),
            model: String::new(),
        }
    }

    /// Create an STT instance using `OpenAI` Whisper
    #[must_use]
    pub fn new_whisper(api_key: SecretString, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            provider: SpeechProvider::OpenAI,
            url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            model,
        }
    }

    /// Transcribe audio to text
    ///
    /// Returns `None` when the service heard no recognizable speech.
    ///
    /// # Arguments
    ///
    /// * `audio` - 16 kHz mono WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<Option<String>> {
        match self.provider {
            SpeechProvider::Azure => self.transcribe_azure(audio).await,
            SpeechProvider::OpenAI => self.transcribe_whisper(audio).await,
        }
    }

    /// Transcribe using the Azure short-audio REST API
    async fn transcribe_azure(&self, audio: &[u8]) -> Result<Option<String>> {
        tracing::debug!(audio_bytes = audio.len(), "starting Azure transcription");

        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", self.api_key.expose_secret())
            .header(
                "Content-Type",
                format!("audio/wav; codecs=audio/pcm; samplerate={SAMPLE_RATE}"),
            )
            .header("Accept", "application/json")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Azure STT request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Azure STT API error");
            return Err(Error::Stt(format!("Azure STT API error {status}: {body}")));
        }

        let result: AzureRecognition = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Azure STT response");
            e
        })?;

        Ok(recognized_text(result))
    }

    /// Transcribe using `OpenAI` Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<Option<String>> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let text = result.text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(Some(text).filter(|t| !t.is_empty()))
    }
}

fn azure_stt_url(region: &str, language: &str) -> String {
    format!(
        "https://{region}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}&format=simple",
        urlencoding::encode(language)
    )
}

/// Only a `Success` status with text counts as recognized speech
fn recognized_text(result: AzureRecognition) -> Option<String> {
    if result.recognition_status != "Success" {
        tracing::info!(status = %result.recognition_status, "no speech recognized");
        return None;
    }

    let text = result.display_text.trim().to_string();
    tracing::info!(transcript = %text, "transcription complete");
    Some(text).filter(|t| !t.is_empty())
}
