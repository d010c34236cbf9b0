// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly for the three session phases (work, finalize, route).

use crate::history::{build_history_section, HistoryBudget};
use crate::models::{HistoryTruncationInfo, StepContext};
use sha2::{Digest, Sha256};
use swarm_registry::StepRouting;

/// An assembled prompt plus the metadata recorded in the receipt.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: String,
    pub system_prompt: String,
    /// Stable hash of the assembled prompt.
    pub prompt_hash: String,
    pub truncation: HistoryTruncationInfo,
}

/// SHA-256 hex digest of a prompt.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn budget_for(ctx: &StepContext) -> HistoryBudget {
    let mut budget = HistoryBudget::default();
    if let Some(overrides) = &ctx.engine_profile.context_budgets {
        if let Some(chars) = overrides.context_budget_chars {
            budget.context_budget_chars = chars;
        }
        if let Some(chars) = overrides.history_max_recent_chars {
            budget.recent_max_chars = chars;
        }
        if let Some(chars) = overrides.history_max_older_chars {
            budget.older_max_chars = chars;
        }
    }
    budget
}

/// Build the work-phase prompt.
///
/// Context comes from the ContextPack when hydration succeeded; otherwise
/// the raw-history section with priority budgeting. Either way the
/// truncation info lands in the receipt with the same shape.
pub fn build_work_prompt(ctx: &StepContext) -> PromptPlan {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# Flow: {} ({}/{})\n## Step: {} - {}\n\n",
        ctx.flow_title, ctx.step_index, ctx.total_steps, ctx.step_id, ctx.step_role
    ));

    if let Some(notes) = &ctx.teaching_notes {
        if !notes.inputs.is_empty() {
            prompt.push_str(&format!("Inputs: {}\n", notes.inputs.join(", ")));
        }
        if !notes.outputs.is_empty() {
            prompt.push_str(&format!("Outputs: {}\n", notes.outputs.join(", ")));
        }
        if !notes.emphasizes.is_empty() {
            prompt.push_str(&format!("Emphasize: {}\n", notes.emphasizes.join(", ")));
        }
        if !notes.constraints.is_empty() {
            prompt.push_str(&format!("Constraints: {}\n", notes.constraints.join(", ")));
        }
        prompt.push('\n');
    }

    let truncation = match &ctx.context_pack {
        Some(pack) if !pack.is_empty() => {
            prompt.push_str("## Context from previous steps\n\n");
            prompt.push_str(&pack.render());
            HistoryTruncationInfo {
                steps_included: pack.entries.len(),
                steps_total: pack.entries.len(),
                chars_used: 0,
                budget_chars: 0,
                truncated: false,
                priority_aware: true,
                priority_distribution: None,
            }
        }
        _ => {
            let (section, info) = build_history_section(&ctx.history, &budget_for(ctx));
            if info.truncated {
                prompt.push_str(&info.truncation_note());
                prompt.push('\n');
            }
            if !section.is_empty() {
                prompt.push_str("## History\n\n");
                prompt.push_str(&section);
            }
            info
        }
    };

    prompt.push_str(
        "\nDo the work for this step now. When finished, summarize what you \
         did and which files you produced.\n",
    );

    let system_prompt = format!(
        "You are the {} agent working inside the {} flow.",
        ctx.primary_agent(),
        ctx.flow_key
    );

    let hash = prompt_hash(&prompt);
    PromptPlan {
        prompt,
        system_prompt,
        prompt_hash: hash,
        truncation,
    }
}

/// Build the finalize-phase prompt asking for a structured envelope.
pub fn build_finalize_prompt(ctx: &StepContext) -> String {
    format!(
        "Produce the handoff envelope for step {step} as a single JSON object \
         with no surrounding prose. Required fields: step_id (\"{step}\"), \
         flow_key (\"{flow}\"), run_id (\"{run}\"), status (one of VERIFIED, \
         UNVERIFIED, PARTIAL, BLOCKED), summary (what was accomplished, under \
         2KB), artifacts (object mapping artifact names to relative paths). \
         Optional: can_further_iteration_help (\"yes\" or \"no\").",
        step = ctx.step_id,
        flow = ctx.flow_key,
        run = ctx.run_id,
    )
}

/// Build the route-phase prompt for the router resolver.
pub fn build_router_prompt(ctx: &StepContext, handoff_json: &str) -> String {
    let routing = ctx.routing_config.as_ref();
    let kind = routing.map(StepRouting::kind_str).unwrap_or("linear");
    let next = routing
        .and_then(StepRouting::next_step)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "null".to_string());
    let (loop_target, success_values, max_iterations) = match routing {
        Some(StepRouting::Microloop {
            loop_target,
            loop_success_values,
            max_iterations,
            ..
        }) => (
            loop_target.to_string(),
            format!("{loop_success_values:?}"),
            *max_iterations,
        ),
        _ => ("null".to_string(), "[]".to_string(), 0),
    };

    format!(
        "You are a routing resolver. Convert the handoff below plus the step \
         routing configuration into a single RoutingSignal JSON object with \
         fields: decision (advance|loop|terminate|branch), next_step_id, \
         route, reason, confidence (0.0-1.0), needs_human. Output ONLY the \
         JSON object.\n\n## Handoff\n```json\n{handoff_json}\n```\n\n\
         ## Routing Configuration\n```yaml\nstep_id: {step}\nflow_key: {flow}\n\
         kind: {kind}\nnext: {next}\nloop_target: {loop_target}\n\
         loop_success_values: {success_values}\nmax_iterations: {max_iterations}\n\
         current_iteration: {iteration}\n```\n",
        step = ctx.step_id,
        flow = ctx.flow_key,
        iteration = ctx.routing.loop_iteration,
    )
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
