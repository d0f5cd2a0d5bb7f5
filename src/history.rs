//! Bounded conversation history
//!
//! Keeps a sliding window of the most recent messages, capped both by
//! message count and by total word count. The system instruction lives
//! outside the window and is only prepended when the conversation is
//! serialized for the chat backend.

use std::cell::OnceCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default maximum number of messages kept in the window
pub const DEFAULT_MAX_LEN: usize = 30;

/// Default maximum number of words kept in the window
pub const DEFAULT_MAX_WORDS: usize = 3000;

/// Conversational role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Transcribed speech from the user
    User,
    /// Reply produced by the chat backend
    Assistant,
    /// System instruction
    System,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    /// Create a message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of whitespace-delimited words in the content
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }
}

/// Count whitespace-delimited tokens
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// History window configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum number of messages in the window
    pub max_len: usize,

    /// Maximum total word count across the window
    pub max_words: usize,

    /// File holding the system instruction
    pub system_prompt_file: Option<PathBuf>,

    /// Re-read the system instruction on every serialization
    pub autoload: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_LEN,
            max_words: DEFAULT_MAX_WORDS,
            system_prompt_file: None,
            autoload: true,
        }
    }
}

/// Sliding window of conversation messages plus a system instruction
#[derive(Debug)]
pub struct HistoryManager {
    max_len: usize,
    max_words: usize,
    messages: VecDeque<Message>,
    words: usize,
    system_prompt_file: Option<PathBuf>,
    autoload: bool,
    cached_prompt: OnceCell<Option<String>>,
}

impl HistoryManager {
    /// Create an empty history window
    ///
    /// `max_len` and `max_words` are taken as given. In cached mode the
    /// system instruction is read right away; a missing file is remembered
    /// as "no instruction".
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        let cached_prompt = match (&config.system_prompt_file, config.autoload) {
            (Some(path), false) => OnceCell::from(read_prompt(path)),
            _ => OnceCell::new(),
        };

        Self {
            max_len: config.max_len,
            max_words: config.max_words,
            messages: VecDeque::new(),
            words: 0,
            system_prompt_file: config.system_prompt_file,
            autoload: config.autoload,
            cached_prompt,
        }
    }

    /// Append a message, evicting from the head until both bounds hold
    ///
    /// The window never shrinks below one message, so a lone message that
    /// is longer than `max_words` stays in place.
    pub fn add(&mut self, message: Message) {
        self.words += message.word_count();
        self.messages.push_back(message);

        while self.messages.len() > 1
            && (self.messages.len() > self.max_len || self.words > self.max_words)
        {
            let Some(evicted) = self.messages.pop_front() else {
                break;
            };
            self.words -= evicted.word_count();
            tracing::trace!(
                role = %evicted.role(),
                words = evicted.word_count(),
                "evicted message from history"
            );
        }
    }

    /// Serialize the conversation for the chat backend
    ///
    /// The system instruction, when available, comes first.
    #[must_use]
    pub fn serialize(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self.system_prompt() {
            out.push(Message::system(prompt));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Resolve the system instruction according to the autoload policy
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let path = self.system_prompt_file.as_deref()?;
        if self.autoload {
            read_prompt(path)
        } else {
            self.cached_prompt.get_or_init(|| read_prompt(path)).clone()
        }
    }

    /// Number of messages in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total word count of the window
    #[must_use]
    pub const fn word_count(&self) -> usize {
        self.words
    }

    /// Messages in chronological order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.back()
    }
}

/// Read the instruction file; missing, unreadable or empty means none
fn read_prompt(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.is_empty() => None,
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "system prompt unavailable");
            None
        }
    }
}
