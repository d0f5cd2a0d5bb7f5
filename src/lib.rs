//! Xiaodou - a voice-driven conversational assistant
//!
//! Listens for a wake word, transcribes the follow-up utterance, asks a
//! chat backend for a reply using a bounded conversation history, and
//! speaks the reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Assistant                        │
//! │   Listener  →  HistoryManager  →  Generator  →  Speaker │
//! └──────┬──────────────────────────────┬───────────┬────┘
//!        │                              │           │
//! ┌──────▼────────────┐        ┌────────▼──┐  ┌─────▼──────────┐
//! │ capture, wake word│        │ chat API  │  │ TTS, playback  │
//! │ STT               │        └───────────┘  └────────────────┘
//! └───────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod history;
pub mod voice;

pub use assistant::{
    Assistant, Generator, Listener, SpeechOutcome, Speaker, TurnOutcome, Utterance,
};
pub use chat::ChatClient;
pub use config::Config;
pub use error::{Error, Result};
pub use history::{HistoryConfig, HistoryManager, Message, Role};
