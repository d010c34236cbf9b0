// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-adapters: external I/O seams (LLM sessions, subprocesses, git scans)

pub mod diff;
pub mod guard;
pub mod llm;
pub mod subprocess;
pub mod transcript;

pub use diff::{scan_file_changes, scan_file_changes_sync};
pub use guard::{GuardViolation, ToolGuard};
pub use llm::{LlmAdapter, LlmError, LlmOutcome, LlmRequest, TokenUsage};
pub use subprocess::{run_shell, run_sync, CommandOutput, SubprocessError};
pub use transcript::{append_transcript, read_transcript, TranscriptEntry};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use llm::{LlmCall, ScriptedLlmAdapter};
