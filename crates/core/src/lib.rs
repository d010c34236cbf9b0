// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-core: data model for the stepwise flow orchestrator

pub mod clock;
pub mod diff;
pub mod envelope;
pub mod event;
pub mod id;
pub mod routing;
pub mod spec;
pub mod state;
pub mod testsum;
pub mod verify;

pub use clock::{utc_now_iso, Clock, FakeClock, SystemClock};
pub use diff::{FileChanges, FileDiff};
pub use envelope::{EnvelopeSource, EnvelopeStatus, HandoffEnvelope};
pub use event::{normalize_kind, EventKind, RunEvent};
pub use id::{generate_run_id, AgentKey, FlowKey, IdGen, RunId, SequentialIdGen, ShortId, StepId, UuidIdGen};
pub use routing::{parse_routing_decision, RoutingCandidate, RoutingDecision, RoutingSignal};
pub use spec::{RunSpec, RunStatus, RunSummary, SdlcStatus};
pub use state::{loop_key, InterruptionFrame, RunState};
pub use testsum::{error_signature, FailureType, SourceFormat, TestFailure, TestSummary};
pub use verify::{CheckType, VerificationCheck, VerificationResult};
