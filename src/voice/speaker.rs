//! Speech output
//!
//! Synthesized audio is written to a temporary file that lives exactly as
//! long as the blocking playback call; it is removed only after playback
//! has drained.

use std::io::Write;
use std::rc::Rc;

use async_trait::async_trait;

use crate::assistant::{SpeechOutcome, Speaker};
use crate::config::Config;
use crate::voice::{AudioPlayback, TextToSpeech};
use crate::Result;

/// Speaks text through the TTS service and the output device
pub struct VoiceSpeaker {
    tts: TextToSpeech,
    playback: Rc<AudioPlayback>,
}

impl VoiceSpeaker {
    /// Create a speaker sharing the given playback handle
    ///
    /// # Errors
    ///
    /// Returns error if the TTS client cannot be configured
    pub fn new(config: &Config, playback: Rc<AudioPlayback>) -> Result<Self> {
        Ok(Self {
            tts: TextToSpeech::new(&config.speech)?,
            playback,
        })
    }

    /// Write audio to a temporary file, play it, then remove the file
    fn play_via_tempfile(&self, audio: &[u8]) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix("xiaodou-")
            .suffix(".mp3")
            .tempfile()?;
        tmp.write_all(audio)?;
        tmp.flush()?;

        tracing::debug!(path = %tmp.path().display(), "text-to-speech, saved");
        self.playback.play_file(tmp.path())?;

        tracing::debug!(path = %tmp.path().display(), "text-to-speech, unlinking");
        tmp.close()?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl Speaker for VoiceSpeaker {
    async fn speak(&mut self, text: &str) -> Result<SpeechOutcome> {
        let audio = match self.tts.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::info!(error = %e, "speech synthesis failed");
                return Ok(SpeechOutcome::Failed(e.to_string()));
            }
        };

        tracing::info!(audio_bytes = audio.len(), "text-to-speech conversion successful");
        self.play_via_tempfile(&audio)?;

        Ok(SpeechOutcome::Spoken)
    }
}
