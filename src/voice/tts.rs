//! Text-to-speech (TTS) processing

use secrecy::{ExposeSecret, SecretString};

use crate::config::{SpeechConfig, SpeechProvider};
use crate::{Error, Result};

/// Azure output format; MP3 so the bytes can go straight to a file
const AZURE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    language: String,
    url: String,
    provider: SpeechProvider,
}

impl TextToSpeech {
    /// Create a TTS instance for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the key or region is missing
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("speech API key required (SPEECH_API_KEY)".to_string()))?;

        let url = match config.provider {
            SpeechProvider::Azure => {
                let region = config.region.as_deref().filter(|r| !r.is_empty()).ok_or_else(|| {
                    Error::Config("speech region required (SPEECH_SERVICE_REGION)".to_string())
                })?;
                format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1")
            }
            SpeechProvider::OpenAI => "https://api.openai.com/v1/audio/speech".to_string(),
        };

        tracing::debug!(provider = ?config.provider, voice = %config.voice, "TTS initialized");

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: config.voice.clone(),
            language: config.language.clone(),
            url,
            provider: config.provider,
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            SpeechProvider::Azure => self.synthesize_azure(text).await,
            SpeechProvider::OpenAI => self.synthesize_openai(text).await,
        }
    }

    /// Synthesize using the Azure Speech REST API
    async fn synthesize_azure(&self, text: &str) -> Result<Vec<u8>> {
        let ssml = build_ssml(&self.language, &self.voice, text);

        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", self.api_key.expose_secret())
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .header("User-Agent", "xiaodou")
            .body(ssml)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("Azure TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using `OpenAI` TTS
    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
        }

        let request = TtsRequest {
            model: "tts-1",
            input: text,
            voice: &self.voice,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// Wrap text in an SSML document for the given voice
#[must_use]
pub fn build_ssml(language: &str, voice: &str, text: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{lang}'>\
         <voice xml:lang='{lang}' name='{voice}'>{text}</voice></speak>",
        lang = escape_xml(language),
        voice = escape_xml(voice),
        text = escape_xml(text),
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssml_contains_voice_and_text() {
        let ssml = build_ssml("zh-CN", "zh-CN-XiaochenNeural", "你好");
        assert!(ssml.starts_with("<speak"));
        assert!(ssml.contains("name='zh-CN-XiaochenNeural'"));
        assert!(ssml.contains(">你好</voice>"));
    }

    #[test]
    fn test_ssml_escapes_markup() {
        let ssml = build_ssml("en-US", "en-US-JennyNeural", "1 < 2 & 'three'");
        assert!(ssml.contains("1 &lt; 2 &amp; &apos;three&apos;"));
        assert!(!ssml.contains("1 < 2"));
    }
}
