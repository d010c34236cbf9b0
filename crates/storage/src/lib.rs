// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! swarm-storage: run directory layout, event journal, handoff I/O, receipts

pub mod env;
mod handoff;
mod journal;
pub mod paths;
mod receipt;
mod store;
mod validator;

pub use handoff::{
    read_handoff_envelope, read_routing_from_envelope, update_envelope_routing, validate_envelope,
    write_handoff_envelope, HandoffError, WriteOptions,
};
pub use journal::{read_events, EventJournal, JournalError};
pub use receipt::{read_step_receipt, write_step_receipt, StepReceipt, TokenCounts};
pub use store::{RunStore, StoreError};
pub use validator::{
    doctor, validate_event_stream, EventContractViolation, Severity, ViolationKind,
};
