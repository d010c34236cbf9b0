// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handoff envelopes: the durable per-step ledger entry.
//!
//! Exactly one committed envelope exists per completed step. The envelope
//! records what the step claims it did (`summary`, `artifacts`), what
//! actually changed on disk (`file_changes`), and where the flow goes next
//! (`routing_signal`). Unknown fields survive read/write round-trips.

use crate::diff::FileChanges;
use crate::id::{FlowKey, RunId, StepId};
use crate::routing::RoutingSignal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Verification status carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeStatus {
    Verified,
    Unverified,
    Partial,
    Blocked,
}

impl EnvelopeStatus {
    /// Severity rank: `BLOCKED < UNVERIFIED < PARTIAL < VERIFIED`.
    /// Join aggregation picks worst/best on this order.
    pub fn rank(&self) -> u8 {
        match self {
            EnvelopeStatus::Blocked => 0,
            EnvelopeStatus::Unverified => 1,
            EnvelopeStatus::Partial => 2,
            EnvelopeStatus::Verified => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeStatus::Verified => "VERIFIED",
            EnvelopeStatus::Unverified => "UNVERIFIED",
            EnvelopeStatus::Partial => "PARTIAL",
            EnvelopeStatus::Blocked => "BLOCKED",
        }
    }

    /// Case-insensitive parse; unknown values land on `Unverified`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "VERIFIED" => EnvelopeStatus::Verified,
            "PARTIAL" => EnvelopeStatus::Partial,
            "BLOCKED" => EnvelopeStatus::Blocked,
            _ => EnvelopeStatus::Unverified,
        }
    }

    pub fn worst(statuses: impl IntoIterator<Item = EnvelopeStatus>) -> Option<EnvelopeStatus> {
        statuses.into_iter().min_by_key(EnvelopeStatus::rank)
    }

    pub fn best(statuses: impl IntoIterator<Item = EnvelopeStatus>) -> Option<EnvelopeStatus> {
        statuses.into_iter().max_by_key(EnvelopeStatus::rank)
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance marker recording which component wrote the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeSource {
    /// Written by the engine's finalize phase.
    Lifecycle,
    /// Written by the orchestrator because the engine left none.
    OrchestratorFallback,
    /// Minimal envelope written by some other last-resort path.
    MinimalEnvelope,
}

/// Durable per-step handoff record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEnvelope {
    pub step_id: StepId,
    pub flow_key: FlowKey,
    pub run_id: RunId,
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub summary: String,
    /// Artifact name → relative path, for files materially produced.
    #[serde(default, deserialize_with = "de_artifacts")]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_changes: Option<FileChanges>,
    /// Set exactly once per step, after the route phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_signal: Option<RoutingSignal>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Critic's signal that another loop iteration cannot improve the result.
    /// Accepts bool or "yes"/"no"-style strings on read.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_yes_no"
    )]
    pub can_further_iteration_help: Option<bool>,
    #[serde(
        rename = "_envelope_source",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub envelope_source: Option<EnvelopeSource>,
    /// Fields this version does not model, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HandoffEnvelope {
    pub fn new(
        step_id: impl Into<StepId>,
        flow_key: impl Into<FlowKey>,
        run_id: impl Into<RunId>,
        status: EnvelopeStatus,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            flow_key: flow_key.into(),
            run_id: run_id.into(),
            status,
            summary: String::new(),
            artifacts: BTreeMap::new(),
            file_changes: None,
            routing_signal: None,
            duration_ms: 0,
            timestamp: None,
            error: None,
            can_further_iteration_help: None,
            envelope_source: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_source(mut self, source: EnvelopeSource) -> Self {
        self.envelope_source = Some(source);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Accept `true`/`false`, `"yes"`/`"no"`, `"true"`/`"false"`, `"1"`/`"0"`, or null.
fn de_yes_no<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct YesNoVisitor;

    impl<'de> de::Visitor<'de> for YesNoVisitor {
        type Value = Option<bool>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("null, a bool, or a yes/no string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "yes" | "true" | "1" | "on"
            )))
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(YesNoVisitor)
        }
    }

    deserializer.deserialize_any(YesNoVisitor)
}

/// Accept a name→path map, or an empty list written by minimal producers.
fn de_artifacts<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct ArtifactsVisitor;

    impl<'de> de::Visitor<'de> for ArtifactsVisitor {
        type Value = BTreeMap<String, String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a map of artifact names to paths, or an empty list")
        }

        fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut out = BTreeMap::new();
            while let Some((k, v)) = map.next_entry::<String, String>()? {
                out.insert(k, v);
            }
            Ok(out)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            // Tolerate list-shaped artifacts; named entries are unrecoverable
            while seq
                .next_element::<serde_json::Value>()?
                .is_some()
            {}
            Ok(BTreeMap::new())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(BTreeMap::new())
        }
    }

    deserializer.deserialize_any(ArtifactsVisitor)
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
