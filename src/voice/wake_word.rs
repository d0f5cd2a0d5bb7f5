//! Wake word detection
//!
//! Segments microphone audio by energy, and matches the wake phrase
//! against the transcript of each segment.

use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// State of the wake word detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
    /// Wake word detected, capturing utterance
    Activated,
}

/// How waiting for the wake word ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordOutcome {
    /// The wake word was heard; carries the segment transcript
    Recognized(String),
    /// Audio input stopped delivering samples
    Canceled(String),
    /// The configured keyword timeout elapsed
    TimedOut,
}

/// Detects wake words in audio
pub struct WakeWordDetector {
    wake_words: Vec<String>,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    heard_speech: bool,
}

impl WakeWordDetector {
    /// Create a new wake word detector
    ///
    /// # Arguments
    ///
    /// * `wake_words` - Phrases to detect (e.g., "小豆")
    ///
    /// # Errors
    ///
    /// Returns error if no non-empty wake word is given
    pub fn new(wake_words: Vec<String>) -> Result<Self> {
        let normalized: Vec<String> = wake_words
            .into_iter()
            .map(|w| w.to_lowercase().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(Error::WakeWord("at least one wake word is required".to_string()));
        }

        tracing::debug!(wake_words = ?normalized, "wake word detector initialized");

        Ok(Self {
            wake_words: normalized,
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            heard_speech: false,
        })
    }

    /// Process audio samples and detect speech activity
    ///
    /// Returns true when a speech segment followed by silence is complete
    /// (not a wake word yet)
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES
                    && self.speech_buffer.len() > MIN_SPEECH_SAMPLES
                {
                    tracing::debug!(
                        samples = self.speech_buffer.len(),
                        "speech segment complete"
                    );
                    return true;
                }

                if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
            DetectorState::Activated => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                    self.heard_speech = true;
                } else {
                    self.silence_counter += samples.len();
                }
            }
        }

        false
    }

    /// Check if transcribed text contains a wake word
    ///
    /// On a match the detector moves to `Activated` with an empty buffer,
    /// ready to capture the follow-up utterance.
    pub fn check_wake_word(&mut self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();

        if let Some(wake_word) = self.wake_words.iter().find(|w| normalized.contains(w.as_str())) {
            tracing::info!(wake_word = %wake_word, transcript, "wake word detected");
            self.activate();
            self.speech_buffer.clear();
            return true;
        }

        self.reset();
        false
    }

    /// Text spoken after the wake word in the same segment
    ///
    /// "小豆，今天天气怎么样" yields "今天天气怎么样". Returns `None` when
    /// no wake word matches or nothing but punctuation follows it.
    #[must_use]
    pub fn request_after_wake_word(&self, transcript: &str) -> Option<String> {
        let end = self
            .wake_words
            .iter()
            .filter_map(|w| wake_word_end(transcript, w))
            .min()?;

        let rest = transcript[end..].trim_start_matches(is_separator).trim_end();
        (!rest.is_empty()).then(|| rest.to_string())
    }

    /// Take the follow-up utterance, if any speech arrived since activation
    ///
    /// The detector is reset either way.
    pub fn take_utterance(&mut self) -> Option<Vec<f32>> {
        let speech = self.heard_speech.then(|| self.take_speech_buffer());
        self.reset();
        speech
    }

    /// Get the accumulated speech buffer
    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Take the speech buffer, clearing it
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech_buffer)
    }

    /// Check if currently activated (wake word was detected)
    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.state == DetectorState::Activated
    }

    /// Check if currently listening for potential wake word
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == DetectorState::Listening
    }

    /// Check if utterance capture is complete (silence after speech)
    #[must_use]
    pub fn is_utterance_complete(&self) -> bool {
        self.state == DetectorState::Activated
            && self.heard_speech
            && self.silence_counter > SILENCE_SAMPLES
            && self.speech_buffer.len() > MIN_SPEECH_SAMPLES
    }

    /// Whether any speech arrived since activation
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.heard_speech = false;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Get the configured wake words
    #[must_use]
    pub fn wake_words(&self) -> &[String] {
        &self.wake_words
    }

    /// Manually activate (skip wake word detection)
    pub const fn activate(&mut self) {
        self.state = DetectorState::Activated;
        self.silence_counter = 0;
        self.heard_speech = false;
    }
}

/// Byte offset just past the first case-insensitive match of `wake_word`
fn wake_word_end(transcript: &str, wake_word: &str) -> Option<usize> {
    let boundaries: Vec<usize> = transcript
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(transcript.len()))
        .collect();

    boundaries.iter().enumerate().find_map(|(n, &start)| {
        boundaries[n + 1..]
            .iter()
            .find(|&&end| transcript[start..end].to_lowercase() == wake_word)
            .copied()
    })
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(c, '，' | '。' | '！' | '？' | '、' | '；' | '：' | '…' | '～')
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
