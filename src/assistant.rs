//! Conversational turn loop
//!
//! One turn is listen → transcribe → generate → speak. Turns run strictly
//! one after another on the calling task.

use async_trait::async_trait;

use crate::history::{HistoryManager, Message};
use crate::{Error, Result};

/// Phrase spoken when the chat backend fails
pub const DEFAULT_FALLBACK_PHRASE: &str = "遇到一些错误，请重说一次";

/// Outcome of listening for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    /// Speech was recognized after the wake word
    Recognized(String),
    /// Nothing matched before the listener gave up
    NoMatch,
    /// Recognition was canceled
    Canceled,
    /// Recognition ended in any other way
    Unknown,
}

impl Utterance {
    /// The transcript, if speech was recognized
    #[must_use]
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::Recognized(text) => Some(text),
            Self::NoMatch | Self::Canceled | Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for Utterance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recognized(text) => f.write_str(text),
            Self::NoMatch => f.write_str("[No Match]"),
            Self::Canceled => f.write_str("[Canceled]"),
            Self::Unknown => f.write_str("[Unknown]"),
        }
    }
}

/// Result of handing text to the speech output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Audio was synthesized and played to completion
    Spoken,
    /// Synthesis failed; nothing was played
    Failed(String),
}

/// Speech input: blocks until the user said something (or didn't)
#[async_trait(?Send)]
pub trait Listener {
    /// Wait for the wake word and transcribe the follow-up utterance
    ///
    /// # Errors
    ///
    /// Returns error if the audio input cannot be used
    async fn listen(&mut self) -> Result<Utterance>;
}

/// Text generation backend
#[async_trait(?Send)]
pub trait Generator {
    /// Produce a reply for the serialized conversation
    ///
    /// # Errors
    ///
    /// Returns error if the backend call fails
    async fn generate(&self, messages: &[Message]) -> Result<String>;
}

/// Speech output
#[async_trait(?Send)]
pub trait Speaker {
    /// Speak `text` aloud
    ///
    /// Synthesis failures are reported through [`SpeechOutcome::Failed`];
    /// errors are reserved for playback and cleanup problems.
    ///
    /// # Errors
    ///
    /// Returns error if playback or temporary file cleanup fails
    async fn speak(&mut self, text: &str) -> Result<SpeechOutcome>;
}

/// What happened during one turn
#[derive(Debug)]
pub enum TurnOutcome {
    /// No usable transcript; history untouched
    Skipped(Utterance),
    /// The backend replied and the reply was handed to the speaker
    Replied {
        reply: String,
        speech: SpeechOutcome,
    },
    /// The backend failed and the fallback phrase was spoken
    Fallback { error: Error },
}

/// The assistant loop and everything it owns
pub struct Assistant<L, G, S> {
    listener: L,
    generator: G,
    speaker: S,
    history: HistoryManager,
    fallback_phrase: String,
}

impl<L, G, S> Assistant<L, G, S>
where
    L: Listener,
    G: Generator,
    S: Speaker,
{
    /// Create an assistant from its collaborators
    pub fn new(listener: L, generator: G, speaker: S, history: HistoryManager) -> Self {
        Self {
            listener,
            generator,
            speaker,
            history,
            fallback_phrase: DEFAULT_FALLBACK_PHRASE.to_string(),
        }
    }

    /// Override the phrase spoken when generation fails
    #[must_use]
    pub fn with_fallback_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.fallback_phrase = phrase.into();
        self
    }

    /// Conversation history
    #[must_use]
    pub const fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Run turns until an error escapes a turn
    ///
    /// # Errors
    ///
    /// Returns the first error raised outside the generation step
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let outcome = self.run_turn().await?;
            tracing::debug!(?outcome, history_len = self.history.len(), "turn finished");
        }
    }

    /// Run a single turn
    ///
    /// Generation errors are absorbed here and answered with the fallback
    /// phrase. Synthesis failures are only logged, and the reply still
    /// goes into history.
    ///
    /// # Errors
    ///
    /// Returns error if listening, speaking or cleanup fails
    pub async fn run_turn(&mut self) -> Result<TurnOutcome> {
        let utterance = self.listener.listen().await?;
        tracing::info!(%utterance, "you said");
        println!("You said: {utterance}");

        let transcript = match utterance {
            Utterance::Recognized(text) => text,
            other => return Ok(TurnOutcome::Skipped(other)),
        };

        self.history.add(Message::user(transcript));

        tracing::info!("start generating response");
        let reply = match self.generator.generate(&self.history.serialize()).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::error!(error = %error, "error generating response");
                let speech = self.speaker.speak(&self.fallback_phrase).await?;
                if let SpeechOutcome::Failed(reason) = speech {
                    tracing::warn!(reason = %reason, "fallback phrase was not spoken");
                }
                return Ok(TurnOutcome::Fallback { error });
            }
        };

        tracing::info!(reply = %reply, "AI said");
        println!("AI said: {reply}");

        let speech = self.speaker.speak(&reply).await?;
        if let SpeechOutcome::Failed(reason) = &speech {
            tracing::info!(reason = %reason, "speech synthesis failed");
        }

        self.history.add(Message::assistant(reply.clone()));

        Ok(TurnOutcome::Replied { reply, speech })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_display() {
        assert_eq!(Utterance::NoMatch.to_string(), "[No Match]");
        assert_eq!(Utterance::Canceled.to_string(), "[Canceled]");
        assert_eq!(Utterance::Unknown.to_string(), "[Unknown]");
        assert_eq!(Utterance::Recognized("你好".into()).to_string(), "你好");
    }

    #[test]
    fn test_only_recognized_has_transcript() {
        assert_eq!(Utterance::Recognized("hi".into()).transcript(), Some("hi"));
        assert!(Utterance::NoMatch.transcript().is_none());
        assert!(Utterance::Canceled.transcript().is_none());
        assert!(Utterance::Unknown.transcript().is_none());
    }
}
