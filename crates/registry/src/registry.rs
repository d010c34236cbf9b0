// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow registry: load-once, read-only source of flow ordering and steps.
//!
//! A top-level `flows.yaml` lists the flows in SDLC order; each flow's steps
//! and cross-cutting agents live in `flows/<key>.yaml`. A missing per-flow
//! file yields a flow with no steps; a malformed file fails the load.

use crate::definition::{FlowDefinition, StepDefinition};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use swarm_core::{AgentKey, FlowKey, StepId};
use thiserror::Error;
use tracing::debug;

/// Sentinel index for unknown flow keys.
pub const UNKNOWN_FLOW_INDEX: u32 = 99;

/// Errors that can occur while loading the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Where an agent appears in the flow graph.
/// Cross-cutting agents carry `step_id = None` and `step_index = 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPosition {
    pub flow_key: FlowKey,
    pub step_id: Option<StepId>,
    pub flow_index: u32,
    pub step_index: u32,
}

#[derive(Debug, Deserialize)]
struct FlowsFile {
    #[serde(default)]
    flows: Vec<FlowEntry>,
}

#[derive(Debug, Deserialize)]
struct FlowEntry {
    key: FlowKey,
    index: u32,
    title: String,
    #[serde(default)]
    short_title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    is_sdlc: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct FlowFile {
    #[serde(default)]
    steps: Vec<StepDefinition>,
    #[serde(default)]
    cross_cutting: Vec<AgentKey>,
    #[serde(default)]
    is_utility_flow: bool,
    #[serde(default)]
    injection_trigger: Option<String>,
}

/// Registry of all flows in SDLC order. Read-only after construction.
#[derive(Debug)]
pub struct FlowRegistry {
    flows: Vec<FlowDefinition>,
    by_key: HashMap<FlowKey, usize>,
    agent_index: HashMap<AgentKey, Vec<AgentPosition>>,
}

impl FlowRegistry {
    /// Load from an explicit top-level file and flows directory.
    pub fn load(config_path: &Path, flows_dir: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(config_path).map_err(|source| RegistryError::Io {
            path: config_path.to_owned(),
            source,
        })?;
        let parsed: FlowsFile =
            serde_yaml::from_str(&raw).map_err(|source| RegistryError::Yaml {
                path: config_path.to_owned(),
                source,
            })?;

        let mut flows = Vec::with_capacity(parsed.flows.len());
        let mut by_key = HashMap::new();
        let mut agent_index: HashMap<AgentKey, Vec<AgentPosition>> = HashMap::new();

        for entry in parsed.flows {
            let flow_file = Self::load_flow_file(flows_dir, &entry.key)?;

            let mut steps = flow_file.steps;
            for (idx, step) in steps.iter_mut().enumerate() {
                step.index = idx as u32 + 1;
            }

            for step in &steps {
                for agent in &step.agents {
                    agent_index.entry(agent.clone()).or_default().push(AgentPosition {
                        flow_key: entry.key.clone(),
                        step_id: Some(step.id.clone()),
                        flow_index: entry.index,
                        step_index: step.index,
                    });
                }
            }
            for agent in &flow_file.cross_cutting {
                agent_index.entry(agent.clone()).or_default().push(AgentPosition {
                    flow_key: entry.key.clone(),
                    step_id: None,
                    flow_index: entry.index,
                    step_index: 0,
                });
            }

            let flow = FlowDefinition {
                key: entry.key.clone(),
                index: entry.index,
                title: entry.title,
                short_title: entry.short_title,
                description: entry.description,
                steps,
                cross_cutting: flow_file.cross_cutting,
                is_sdlc: entry.is_sdlc,
                is_utility_flow: flow_file.is_utility_flow,
                injection_trigger: flow_file.injection_trigger,
            };

            by_key.insert(flow.key.clone(), flows.len());
            flows.push(flow);
        }

        debug!(flows = flows.len(), "flow registry loaded");

        Ok(Self {
            flows,
            by_key,
            agent_index,
        })
    }

    /// Load from a config root containing `flows.yaml` and `flows/`.
    pub fn load_root(config_root: &Path) -> Result<Self, RegistryError> {
        Self::load(&config_root.join("flows.yaml"), &config_root.join("flows"))
    }

    fn load_flow_file(flows_dir: &Path, key: &FlowKey) -> Result<FlowFile, RegistryError> {
        let path = flows_dir.join(format!("{key}.yaml"));
        if !path.exists() {
            debug!(%key, "no per-flow file, flow has no steps");
            return Ok(FlowFile::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| RegistryError::Yaml { path, source })
    }

    /// Process-wide registry, loaded once. Tests construct instances directly.
    pub fn global(config_root: &Path) -> Result<Arc<FlowRegistry>, RegistryError> {
        static GLOBAL: OnceLock<Arc<FlowRegistry>> = OnceLock::new();
        if let Some(registry) = GLOBAL.get() {
            return Ok(Arc::clone(registry));
        }
        let loaded = Arc::new(Self::load_root(config_root)?);
        Ok(Arc::clone(GLOBAL.get_or_init(|| loaded)))
    }

    /// Flow keys in SDLC order.
    pub fn flow_order(&self) -> Vec<FlowKey> {
        self.flows.iter().map(|f| f.key.clone()).collect()
    }

    /// All flow definitions in order.
    pub fn flows(&self) -> &[FlowDefinition] {
        &self.flows
    }

    pub fn get_flow(&self, key: &FlowKey) -> Option<&FlowDefinition> {
        self.by_key.get(key).map(|&i| &self.flows[i])
    }

    /// Numeric index for a flow key, or [`UNKNOWN_FLOW_INDEX`].
    pub fn get_index(&self, key: &FlowKey) -> u32 {
        self.get_flow(key).map(|f| f.index).unwrap_or(UNKNOWN_FLOW_INDEX)
    }

    pub fn get_steps(&self, flow_key: &FlowKey) -> &[StepDefinition] {
        self.get_flow(flow_key).map(|f| f.steps.as_slice()).unwrap_or(&[])
    }

    /// 1-based step index within a flow, or 0 when missing.
    pub fn get_step_index(&self, flow_key: &FlowKey, step_id: &StepId) -> u32 {
        self.get_flow(flow_key)
            .and_then(|f| f.get_step(step_id))
            .map(|s| s.index)
            .unwrap_or(0)
    }

    /// All positions for an agent, step-attached and cross-cutting.
    pub fn get_agent_positions(&self, agent_key: &AgentKey) -> &[AgentPosition] {
        self.agent_index
            .get(agent_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Spec id for a flow key, e.g. `build` → `3-build`.
    /// Unknown keys come back unchanged.
    pub fn spec_id(&self, flow_key: &FlowKey) -> String {
        let index = self.get_index(flow_key);
        if index == UNKNOWN_FLOW_INDEX {
            return flow_key.to_string();
        }
        format!("{index}-{flow_key}")
    }

    pub fn total_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn total_steps(&self, flow_key: &FlowKey) -> usize {
        self.get_steps(flow_key).len()
    }

    pub fn sdlc_flows(&self) -> Vec<&FlowDefinition> {
        self.flows.iter().filter(|f| f.is_sdlc).collect()
    }

    pub fn sdlc_flow_keys(&self) -> Vec<FlowKey> {
        self.flows
            .iter()
            .filter(|f| f.is_sdlc)
            .map(|f| f.key.clone())
            .collect()
    }

    pub fn total_sdlc_flows(&self) -> usize {
        self.flows.iter().filter(|f| f.is_sdlc).count()
    }

    /// Utility flows that can be injected mid-run, with their triggers.
    pub fn utility_flows(&self) -> Vec<&FlowDefinition> {
        self.flows.iter().filter(|f| f.is_utility_flow).collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
