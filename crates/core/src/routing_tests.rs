// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    advance = { "advance", RoutingDecision::Advance },
    proceed = { "proceed", RoutingDecision::Advance },
    cont = { "continue", RoutingDecision::Advance },
    next = { "next", RoutingDecision::Advance },
    lp = { "loop", RoutingDecision::Loop },
    rerun = { "rerun", RoutingDecision::Loop },
    retry = { "retry", RoutingDecision::Loop },
    repeat = { "repeat", RoutingDecision::Loop },
    terminate = { "terminate", RoutingDecision::Terminate },
    blocked = { "blocked", RoutingDecision::Terminate },
    stop = { "stop", RoutingDecision::Terminate },
    end = { "end", RoutingDecision::Terminate },
    exit = { "exit", RoutingDecision::Terminate },
    branch = { "branch", RoutingDecision::Branch },
    route = { "route", RoutingDecision::Branch },
    switch = { "switch", RoutingDecision::Branch },
    redirect = { "redirect", RoutingDecision::Branch },
    unknown = { "wander", RoutingDecision::Advance },
    mixed_case = { " Proceed ", RoutingDecision::Advance },
)]
fn decision_alias_table(input: &str, expected: RoutingDecision) {
    assert_eq!(parse_routing_decision(input), expected);
}

#[test]
fn every_canonical_decision_round_trips() {
    for decision in [
        RoutingDecision::Advance,
        RoutingDecision::Loop,
        RoutingDecision::Terminate,
        RoutingDecision::Branch,
    ] {
        assert_eq!(parse_routing_decision(decision.as_str()), decision);
        // serde round-trip uses the same canonical spelling
        let json = serde_json::to_string(&decision).unwrap();
        assert_eq!(json, format!("\"{}\"", decision.as_str()));
        let back: RoutingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }
}

#[test]
fn signal_constructors() {
    let advance = RoutingSignal::advance(Some(StepId::new("implement")), "spec_linear", 1.0);
    assert_eq!(advance.decision, RoutingDecision::Advance);
    assert_eq!(advance.next_step_id, Some(StepId::new("implement")));

    let lp = RoutingSignal::loop_to(StepId::new("author_tests"), "spec_microloop_continue");
    assert_eq!(lp.decision, RoutingDecision::Loop);
    assert_eq!(lp.confidence, 1.0);

    let term = RoutingSignal::terminate("spec_terminal");
    assert_eq!(term.decision, RoutingDecision::Terminate);
    assert!(term.next_step_id.is_none());

    let branch = RoutingSignal::branch(StepId::new("hotfix"), "BLOCKED", "spec_branch");
    assert_eq!(branch.route.as_deref(), Some("BLOCKED"));
}

#[test]
fn signal_serialization_omits_empty_audit_fields() {
    let signal = RoutingSignal::terminate("done");
    let json = serde_json::to_value(&signal).unwrap();
    assert!(json.get("routing_candidates").is_none());
    assert!(json.get("chosen_candidate_id").is_none());
    assert!(json.get("next_step_id").is_none());
}

#[test]
fn signal_with_candidates_round_trips() {
    let signal = RoutingSignal::advance(Some(StepId::new("commit")), "spec_linear", 1.0)
        .with_source("routing_config")
        .with_candidates(vec![RoutingCandidate {
            id: "c1".to_string(),
            action: "advance".to_string(),
            target_node: Some(StepId::new("commit")),
            reason: "linear next".to_string(),
            priority: 10,
            source: "routing_config".to_string(),
            is_default: true,
        }]);

    let json = serde_json::to_string(&signal).unwrap();
    let back: RoutingSignal = serde_json::from_str(&json).unwrap();
    assert_eq!(back, signal);
}
