// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The four-phase step engine contract: hydrate → work → finalize → route.

use crate::context_pack::build_context_pack;
use crate::models::{FinalizationResult, StepContext, StepResult};
use async_trait::async_trait;
use swarm_core::{HandoffEnvelope, RoutingSignal, RunEvent, StepId};
use swarm_storage::update_envelope_routing;

/// Output of the work phase.
#[derive(Debug, Clone, Default)]
pub struct WorkOutput {
    pub result: StepResult,
    pub events: Vec<RunEvent>,
    pub work_summary: String,
}

/// A step engine drives one step through its lifecycle.
///
/// Engines must leave a transcript and a receipt on every invocation,
/// including stub mode and failures. Failure paths return structured
/// results; nothing unwinds across step boundaries.
#[async_trait]
pub trait StepEngine: Send + Sync {
    /// Engine identifier used in transcript filenames and receipts.
    fn id(&self) -> &str;

    /// Phase A: attach a ContextPack when absent.
    ///
    /// The default builds one from prior steps' committed envelopes and
    /// leaves the raw-history prompt as the fallback.
    fn hydrate(&self, ctx: &mut StepContext) {
        if ctx.context_pack.is_none() {
            let prior: Vec<StepId> = ctx.history.iter().map(|h| h.step_id.clone()).collect();
            ctx.context_pack = build_context_pack(&ctx.run_base(), &prior);
        }
    }

    /// Phase B: perform the step's work.
    async fn run_worker(&self, ctx: &StepContext) -> WorkOutput;

    /// Phase C: commit the handoff envelope (JIT finalization).
    async fn finalize_step(
        &self,
        ctx: &StepContext,
        result: &StepResult,
        work_summary: &str,
    ) -> FinalizationResult;

    /// Phase D: produce a routing signal, or `None` when the engine
    /// cannot decide (the orchestrator then runs the fallback driver).
    async fn route_step(
        &self,
        ctx: &StepContext,
        envelope: &HandoffEnvelope,
    ) -> Option<RoutingSignal>;

    /// Convenience: run all four phases, persisting the routing signal
    /// into the committed envelope.
    async fn run_step(&self, ctx: &mut StepContext) -> (StepResult, Vec<RunEvent>) {
        self.hydrate(ctx);

        let work = self.run_worker(ctx).await;
        let mut events = work.events;

        let finalization = self
            .finalize_step(ctx, &work.result, &work.work_summary)
            .await;
        events.extend(finalization.events);

        if let Some(envelope) = &finalization.envelope {
            if let Some(signal) = self.route_step(ctx, envelope).await {
                update_envelope_routing(&ctx.run_base(), &ctx.step_id, &signal);
            }
        }

        (work.result, events)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
