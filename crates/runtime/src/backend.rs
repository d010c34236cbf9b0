// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run backends: scheduling runs behind a capability record.
//!
//! Engines and backends are values looked up in a registry, not an
//! inheritance hierarchy. `start` is non-blocking: the run directory and
//! initial events are materialized before it returns, then the flows
//! execute on a background task.

use crate::orchestrator::StepwiseOrchestrator;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use swarm_core::{
    generate_run_id, utc_now_iso, EventKind, RunEvent, RunId, RunSpec, RunStatus, RunSummary,
    SdlcStatus,
};
use swarm_engine::StepEngine;
use swarm_storage::StoreError;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
}

/// Capability record describing a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub id: String,
    pub label: String,
    pub supports_streaming: bool,
    pub supports_events: bool,
    pub supports_cancel: bool,
    pub supports_replay: bool,
}

/// A run scheduler: materializes runs and executes their flows.
#[async_trait]
pub trait RunBackend: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Create the run and schedule execution. Non-blocking: the run
    /// directory, spec and initial events exist before this returns.
    async fn start(&self, spec: RunSpec) -> Result<RunId, BackendError>;

    fn get_summary(&self, run_id: &RunId) -> Option<RunSummary>;

    fn list_summaries(&self) -> Vec<RunSummary>;

    fn get_events(&self, run_id: &RunId) -> Vec<RunEvent>;

    /// Request cancellation. Returns false when the run is unknown.
    async fn cancel(&self, run_id: &RunId) -> bool;
}

/// Backend driving the stepwise orchestrator over a run spec's flow list.
pub struct StepwiseBackend<E> {
    orchestrator: Arc<StepwiseOrchestrator<E>>,
    cancel_flags: Mutex<HashMap<RunId, Arc<AtomicBool>>>,
}

impl<E: StepEngine + 'static> StepwiseBackend<E> {
    pub fn new(orchestrator: StepwiseOrchestrator<E>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Execute every flow in the spec sequentially, updating the summary
    /// and emitting run lifecycle events.
    async fn execute_run(
        orchestrator: Arc<StepwiseOrchestrator<E>>,
        run_id: RunId,
        spec: RunSpec,
        cancel: Arc<AtomicBool>,
    ) {
        let store = orchestrator.store();

        let _ = store.update_summary(&run_id, |s| {
            s.status = RunStatus::Running;
            s.started_at = Some(utc_now_iso());
        });
        let _ = store.append_event(
            RunEvent::new(
                run_id.clone(),
                EventKind::RunStarted,
                spec.flow_keys.first().cloned().unwrap_or_default(),
            ),
        );

        let mut final_status = RunStatus::Succeeded;
        let mut error: Option<String> = None;

        for flow_key in &spec.flow_keys {
            match orchestrator
                .run_flow(flow_key, &spec, &run_id, None, Some(Arc::clone(&cancel)))
                .await
            {
                Ok(result) if result.succeeded() => {}
                Ok(result) if result.status == RunStatus::Canceled => {
                    final_status = RunStatus::Canceled;
                    break;
                }
                Ok(result) => {
                    final_status = RunStatus::Failed;
                    error = result.error;
                    break;
                }
                Err(e) => {
                    final_status = RunStatus::Failed;
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        let _ = store.update_summary(&run_id, |s| {
            s.status = final_status;
            s.completed_at = Some(utc_now_iso());
            s.sdlc_status = match final_status {
                RunStatus::Succeeded => SdlcStatus::Ok,
                RunStatus::Canceled => SdlcStatus::Unknown,
                _ => SdlcStatus::Error,
            };
            s.error = error.clone();
        });
        let _ = store.append_event(
            RunEvent::new(
                run_id.clone(),
                EventKind::RunCompleted,
                spec.flow_keys.last().cloned().unwrap_or_default(),
            )
            .with_payload(serde_json::json!({
                "status": final_status.as_str(),
                "error": error,
            })),
        );

        info!(%run_id, status = %final_status, "run execution finished");
    }
}

#[async_trait]
impl<E: StepEngine + 'static> RunBackend for StepwiseBackend<E> {
    fn id(&self) -> &str {
        "stepwise"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            id: "stepwise".to_string(),
            label: "Stepwise Orchestrator".to_string(),
            supports_streaming: false,
            supports_events: true,
            supports_cancel: true,
            supports_replay: true,
        }
    }

    async fn start(&self, spec: RunSpec) -> Result<RunId, BackendError> {
        let run_id = generate_run_id();
        let store = self.orchestrator.store();

        // Materialize the run before returning
        store.write_spec(&run_id, &spec)?;
        store.write_summary(&RunSummary::new(run_id.clone(), spec.clone(), utc_now_iso()))?;
        store.append_event(
            RunEvent::new(
                run_id.clone(),
                EventKind::RunCreated,
                spec.flow_keys.first().cloned().unwrap_or_default(),
            )
            .with_payload(serde_json::json!({
                "backend": spec.backend,
                "initiator": spec.initiator,
            })),
        )?;
        store.append_event(
            RunEvent::new(
                run_id.clone(),
                EventKind::BackendInit,
                spec.flow_keys.first().cloned().unwrap_or_default(),
            )
            .with_payload(serde_json::json!({"backend_id": self.id()})),
        )?;

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel_flags
            .lock()
            .insert(run_id.clone(), Arc::clone(&cancel));

        let orchestrator = Arc::clone(&self.orchestrator);
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            Self::execute_run(orchestrator, task_run_id, spec, cancel).await;
        });

        Ok(run_id)
    }

    fn get_summary(&self, run_id: &RunId) -> Option<RunSummary> {
        self.orchestrator.store().read_summary(run_id).ok().flatten()
    }

    fn list_summaries(&self) -> Vec<RunSummary> {
        let store = self.orchestrator.store();
        store
            .list_runs()
            .iter()
            .filter_map(|run_id| store.read_summary(run_id).ok().flatten())
            .collect()
    }

    fn get_events(&self, run_id: &RunId) -> Vec<RunEvent> {
        self.orchestrator
            .store()
            .get_events(run_id)
            .unwrap_or_default()
    }

    async fn cancel(&self, run_id: &RunId) -> bool {
        let Some(flag) = self.cancel_flags.lock().get(run_id).cloned() else {
            warn!(%run_id, "cancel requested for unknown run");
            return false;
        };
        flag.store(true, Ordering::SeqCst);
        true
    }
}

/// Registry of backends keyed by id (dynamic dispatch by value).
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn RunBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn RunBackend>) {
        self.backends.insert(backend.id().to_string(), backend);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn RunBackend>, BackendError> {
        self.backends
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::UnknownBackend(id.to_string()))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn capabilities(&self) -> Vec<BackendCapabilities> {
        let mut caps: Vec<BackendCapabilities> =
            self.backends.values().map(|b| b.capabilities()).collect();
        caps.sort_by(|a, b| a.id.cmp(&b.id));
        caps
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
