//! Microphone listener
//!
//! Waits for the wake word, plays the start chime, records the follow-up
//! utterance, plays the end chime and transcribes what was said.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::assistant::{Listener, Utterance};
use crate::config::Config;
use crate::voice::{
    AudioCapture, AudioPlayback, KeywordOutcome, SAMPLE_RATE, SpeechToText, WakeWordDetector,
    samples_to_wav,
};
use crate::Result;

/// Audio processing chunk size (100ms at 16kHz)
const CHUNK_SIZE: usize = 1600;

/// Polling interval for the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single follow-up utterance
const MAX_UTTERANCE: Duration = Duration::from_secs(15);

/// Listens on the microphone for one utterance per call
pub struct SpeechListener {
    capture: AudioCapture,
    detector: WakeWordDetector,
    stt: SpeechToText,
    playback: Rc<AudioPlayback>,
    keyword_timeout: Option<Duration>,
    sound_start: PathBuf,
    sound_end: PathBuf,
}

impl SpeechListener {
    /// Open the input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the input device or STT client cannot be set up
    pub fn new(config: &Config, playback: Rc<AudioPlayback>) -> Result<Self> {
        let stt = SpeechToText::new(&config.speech)?;
        let detector = WakeWordDetector::new(vec![config.wake.word.clone()])?;
        let mut capture = AudioCapture::new(config.audio.input_device.as_deref())?;
        capture.start()?;

        Ok(Self {
            capture,
            detector,
            stt,
            playback,
            keyword_timeout: config.wake.timeout,
            sound_start: config.wake.sound_start.clone(),
            sound_end: config.wake.sound_end.clone(),
        })
    }

    /// Block until the wake word is heard, canceled or timed out
    ///
    /// # Errors
    ///
    /// Returns error if audio cannot be encoded
    pub async fn wait_for_keyword(&mut self) -> Result<KeywordOutcome> {
        tracing::info!(
            wake_words = ?self.detector.wake_words(),
            "say the wake word followed by whatever you want"
        );

        self.detector.reset();
        self.capture.clear_buffer();
        let started = Instant::now();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            if self.capture.has_failed() {
                return Ok(KeywordOutcome::Canceled("audio capture stream failed".to_string()));
            }
            if self.keyword_timeout.is_some_and(|t| started.elapsed() >= t) {
                return Ok(KeywordOutcome::TimedOut);
            }
            if self.capture.buffered_len() < CHUNK_SIZE {
                continue;
            }

            let samples = self.capture.take_buffer();
            if !self.detector.process(&samples) {
                continue;
            }

            let segment = self.detector.take_speech_buffer();
            if segment.len() <= SAMPLE_RATE as usize / 2 {
                self.detector.reset();
                continue;
            }

            tracing::debug!(samples = segment.len(), "checking for wake word");
            let wav = samples_to_wav(&segment, SAMPLE_RATE)?;
            match self.stt.transcribe(&wav).await {
                Ok(Some(text)) => {
                    if self.detector.check_wake_word(&text) {
                        return Ok(KeywordOutcome::Recognized(text));
                    }
                }
                Ok(None) => self.detector.reset(),
                Err(e) => {
                    tracing::warn!(error = %e, "wake word transcription failed");
                    self.detector.reset();
                }
            }
        }
    }

    /// Record until trailing silence or the utterance time limit
    ///
    /// Returns `None` when nothing but silence followed the wake word.
    async fn capture_utterance(&mut self) -> Option<Vec<f32>> {
        self.capture.clear_buffer();
        self.detector.activate();
        let started = Instant::now();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let samples = self.capture.take_buffer();
            if !samples.is_empty() {
                self.detector.process(&samples);
            }

            if self.detector.is_utterance_complete() {
                break;
            }
            if self.capture.has_failed() || started.elapsed() >= MAX_UTTERANCE {
                tracing::debug!(
                    heard_speech = self.detector.heard_speech(),
                    "utterance capture stopped early"
                );
                break;
            }
        }

        self.detector.take_utterance()
    }

    /// Play a chime; a missing file is skipped
    fn chime(&self, path: &std::path::Path) -> Result<()> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "chime not found, skipping");
            return Ok(());
        }
        self.playback.play_file(path)
    }
}

#[async_trait(?Send)]
impl Listener for SpeechListener {
    async fn listen(&mut self) -> Result<Utterance> {
        let transcript = match self.wait_for_keyword().await? {
            KeywordOutcome::Recognized(text) => text,
            other => return Ok(keyword_sentinel(&other)),
        };
        tracing::info!(transcript = %transcript, "keyword recognized");

        if let Some(request) = self.detector.request_after_wake_word(&transcript) {
            self.detector.reset();
            self.chime(&self.sound_start)?;
            self.chime(&self.sound_end)?;
            tracing::info!(transcript = %request, "speech recognized with wake word");
            return Ok(Utterance::Recognized(request));
        }

        self.chime(&self.sound_start)?;
        let speech = self.capture_utterance().await;
        self.chime(&self.sound_end)?;

        let Some(speech) = speech else {
            tracing::info!("no speech after wake word");
            return Ok(Utterance::Unknown);
        };

        let wav = samples_to_wav(&speech, SAMPLE_RATE)?;
        Ok(follow_up_utterance(self.stt.transcribe(&wav).await))
    }
}

/// Sentinel for a keyword wait that did not hear the wake word
fn keyword_sentinel(outcome: &KeywordOutcome) -> Utterance {
    match outcome {
        KeywordOutcome::Recognized(text) => Utterance::Recognized(text.clone()),
        KeywordOutcome::Canceled(reason) => {
            tracing::info!(reason = %reason, "keyword recognition canceled");
            Utterance::Canceled
        }
        KeywordOutcome::TimedOut => {
            tracing::info!("keyword recognition timed out");
            Utterance::NoMatch
        }
    }
}

/// Map the follow-up transcription to an utterance
fn follow_up_utterance(result: Result<Option<String>>) -> Utterance {
    match result {
        Ok(Some(text)) if !text.trim().is_empty() => {
            tracing::info!(transcript = %text, "speech recognized");
            Utterance::Recognized(text)
        }
        Ok(_) => Utterance::Unknown,
        Err(e) => {
            tracing::info!(error = %e, "speech recognition failed");
            Utterance::Unknown
        }
    }
}
