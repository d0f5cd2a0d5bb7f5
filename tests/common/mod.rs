//! Shared test utilities

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::rc::Rc;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use xiaodou::{Error, Generator, Listener, Message, Result, SpeechOutcome, Speaker, Utterance};

/// Write a system prompt to a temporary file
#[must_use]
pub fn prompt_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create prompt file");
    file.write_all(content.as_bytes())
        .expect("failed to write prompt file");
    file
}

/// Listener that replays a fixed script of utterances
pub struct ScriptedListener {
    script: VecDeque<Utterance>,
}

impl ScriptedListener {
    pub fn new(script: impl IntoIterator<Item = Utterance>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

#[async_trait(?Send)]
impl Listener for ScriptedListener {
    async fn listen(&mut self) -> Result<Utterance> {
        self.script
            .pop_front()
            .ok_or_else(|| Error::Audio("script exhausted".to_string()))
    }
}

/// Generator that records the conversations it was asked about
#[derive(Clone)]
pub struct FakeGenerator {
    replies: Rc<RefCell<VecDeque<Result<String>>>>,
    pub calls: Rc<RefCell<Vec<Vec<Message>>>>,
}

impl FakeGenerator {
    pub fn new(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            replies: Rc::new(RefCell::new(replies.into_iter().collect())),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

#[async_trait(?Send)]
impl Generator for FakeGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Chat("no reply scripted".to_string())))
    }
}

/// Speaker that records what it was asked to say
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    pub spoken: Rc<RefCell<Vec<String>>>,
    fail_synthesis: bool,
}

impl FakeSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A speaker whose synthesis always fails
    pub fn failing() -> Self {
        Self {
            fail_synthesis: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Speaker for FakeSpeaker {
    async fn speak(&mut self, text: &str) -> Result<SpeechOutcome> {
        self.spoken.borrow_mut().push(text.to_string());
        if self.fail_synthesis {
            return Ok(SpeechOutcome::Failed("synthesis unavailable".to_string()));
        }
        Ok(SpeechOutcome::Spoken)
    }
}
