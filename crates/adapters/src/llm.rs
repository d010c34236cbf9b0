// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LLM adapter seam.
//!
//! The orchestrator core never talks to a vendor SDK directly. An
//! [`LlmAdapter`] turns a prompt into assistant text plus a tool-call
//! transcript; concrete adapters live outside this workspace. The
//! [`ScriptedLlmAdapter`] drives engine tests without a backend.

use crate::transcript::TranscriptEntry;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by LLM adapters
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm session failed: {0}")]
    Session(String),
    #[error("llm session timed out after {0} ms")]
    Timeout(u64),
    #[error("no scripted response queued for prompt")]
    Exhausted,
}

/// Token accounting reported by an adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// A single request into an LLM session.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Appended to the adapter's system prompt (agent persona).
    pub system_prompt: Option<String>,
    pub prompt: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub allowed_tools: Vec<String>,
    pub permission_mode: Option<String>,
    pub cwd: Option<PathBuf>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

/// What came back from one LLM exchange.
#[derive(Debug, Clone, Default)]
pub struct LlmOutcome {
    pub text: String,
    pub transcript: Vec<TranscriptEntry>,
    pub tokens: TokenUsage,
    pub model: String,
}

impl LlmOutcome {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Adapter over a vendor LLM session.
///
/// One adapter session handles the whole step in session mode; [`send`]
/// continues the same hot context.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Short engine identifier used in transcript filenames ("claude", "stub").
    fn id(&self) -> &str;

    /// Provider name recorded in receipts.
    fn provider(&self) -> &str;

    /// Send one prompt into the session and await the full response.
    async fn send(&self, request: LlmRequest) -> Result<LlmOutcome, LlmError>;
}

/// Record of one call into a [`ScriptedLlmAdapter`].
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub prompt: String,
    pub system_prompt: Option<String>,
}

/// Test adapter that replays queued responses and records calls.
#[cfg(any(test, feature = "test-support"))]
pub struct ScriptedLlmAdapter {
    responses: parking_lot::Mutex<std::collections::VecDeque<Result<LlmOutcome, String>>>,
    calls: parking_lot::Mutex<Vec<LlmCall>>,
}

#[cfg(any(test, feature = "test-support"))]
impl ScriptedLlmAdapter {
    pub fn new() -> Self {
        Self {
            responses: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .push_back(Ok(LlmOutcome::text_only(text)));
    }

    pub fn push_outcome(&self, outcome: LlmOutcome) {
        self.responses.lock().push_back(Ok(outcome));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for ScriptedLlmAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl LlmAdapter for ScriptedLlmAdapter {
    fn id(&self) -> &str {
        "scripted"
    }

    fn provider(&self) -> &str {
        "test"
    }

    async fn send(&self, request: LlmRequest) -> Result<LlmOutcome, LlmError> {
        self.calls.lock().push(LlmCall {
            prompt: request.prompt.clone(),
            system_prompt: request.system_prompt.clone(),
        });
        match self.responses.lock().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(LlmError::Session(message)),
            None => Err(LlmError::Exhausted),
        }
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
