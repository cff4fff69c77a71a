//! C10 — execution registry, per spec.md §4.8.
//!
//! A bounded in-memory store of [`ExecutionState`]. Only the orchestrator
//! (C11) ever writes to it; every other component gets a read-only
//! projection via [`ExecutionStatusResult`]. Grounded on
//! `bridges/performance_tracker.rs`'s bounded `execution_history` store,
//! generalized to the LRU-by-`createdAt` + oldest-quartile eviction
//! spec.md §3/§4.8 specify instead of a plain unbounded `Vec`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::constants::{REGISTRY_CAPACITY, REGISTRY_TERMINAL_EVICTION_AGE_SECS};
use crate::error::is_non_recoverable_message;
use crate::types::{ExecutionState, ExecutionStatus, StepStatus};

/// Read-only projection of an [`ExecutionState`], the shape
/// `getExecutionStatus` actually hands back to a caller.
#[derive(Debug, Clone)]
pub struct ExecutionStatusResult {
    pub found: bool,
    pub status: Option<ExecutionStatus>,
    pub current_step: Option<usize>,
    pub steps: Vec<StepStatus>,
    pub progress: u8,
    pub tx_hash: Option<String>,
    pub receiving_tx_hash: Option<String>,
    pub error: Option<crate::error::BridgeError>,
    pub recoverable: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ExecutionStatusResult {
    fn not_found() -> Self {
        Self {
            found: false,
            status: None,
            current_step: None,
            steps: Vec::new(),
            progress: 0,
            tx_hash: None,
            receiving_tx_hash: None,
            error: None,
            recoverable: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Read-side metrics projection over the registry, per SPEC_FULL.md §9 —
/// a pure reader, so it does not violate "C11 is the sole writer to C10".
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub avg_completion_seconds: Option<f64>,
}

/// A field-level patch applied by [`ExecutionRegistry::update`]. `None`
/// means "leave unchanged" for every field except those explicitly set.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub current_step_index: Option<usize>,
    pub tx_hash: Option<String>,
    pub receiving_tx_hash: Option<String>,
    pub to_amount: Option<String>,
    pub received_amount: Option<String>,
    pub progress: Option<u8>,
    pub substatus: Option<String>,
    pub error: Option<crate::error::BridgeError>,
    pub failed_step_index: Option<usize>,
}

pub struct ExecutionRegistry {
    states: DashMap<String, ExecutionState>,
    /// `createdAt` index for eviction ordering, avoiding an O(n log n)
    /// sort on every insert at capacity.
    created_order: std::sync::Mutex<BTreeMap<DateTime<Utc>, String>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self { states: DashMap::new(), created_order: std::sync::Mutex::new(BTreeMap::new()) }
    }

    pub fn create(&self, execution_id: &str, quote_id: &str, total_steps: usize, from_amount: &str, from_chain_id: u64, to_chain_id: u64, estimated_time: u64) -> ExecutionState {
        self.evict_if_at_capacity();

        let now = Utc::now();
        let state = ExecutionState {
            execution_id: execution_id.to_string(),
            quote_id: quote_id.to_string(),
            status: ExecutionStatus::Pending,
            current_step_index: 0,
            total_steps,
            steps: Vec::new(),
            tx_hash: None,
            receiving_tx_hash: None,
            from_amount: from_amount.to_string(),
            to_amount: None,
            received_amount: None,
            from_chain_id,
            to_chain_id,
            progress: 0,
            estimated_time,
            substatus: "pending".to_string(),
            error: None,
            retry_count: 0,
            previous_errors: Vec::new(),
            failed_step_index: None,
            created_at: now,
            updated_at: now,
        };

        self.states.insert(execution_id.to_string(), state.clone());
        self.created_order.lock().unwrap().insert(now, execution_id.to_string());
        state
    }

    /// Merge a patch into the existing state and stamp `updated_at`. A
    /// no-op if `execution_id` is unknown or the existing state is already
    /// terminal and the patch doesn't itself carry a terminal status, per
    /// spec.md §3's "no further mutation" invariant.
    pub fn update(&self, execution_id: &str, patch: ExecutionPatch) {
        if let Some(mut entry) = self.states.get_mut(execution_id) {
            // Terminal states only accept another terminal transition (e.g.
            // re-recording the same failure); anything else is dropped to
            // keep spec §3's "terminal is terminal" invariant.
            if entry.status.is_terminal() && patch.status.map(|s| !s.is_terminal()).unwrap_or(true) {
                return;
            }
            if let Some(status) = patch.status {
                entry.status = status;
            }
            if let Some(index) = patch.current_step_index {
                entry.current_step_index = index;
            }
            if let Some(tx_hash) = patch.tx_hash {
                entry.tx_hash = Some(tx_hash);
            }
            if let Some(receiving) = patch.receiving_tx_hash {
                entry.receiving_tx_hash = Some(receiving);
            }
            if let Some(to_amount) = patch.to_amount {
                entry.to_amount = Some(to_amount);
            }
            if let Some(received) = patch.received_amount {
                entry.received_amount = Some(received);
            }
            if let Some(progress) = patch.progress {
                entry.progress = progress.max(entry.progress);
            }
            if let Some(substatus) = patch.substatus {
                entry.substatus = substatus;
            }
            if let Some(error) = patch.error {
                if let Some(previous) = entry.error.take() {
                    entry.previous_errors.push(previous);
                }
                entry.error = Some(error);
            }
            if let Some(failed_index) = patch.failed_step_index {
                entry.failed_step_index = Some(failed_index);
            }
            entry.updated_at = Utc::now();
        }
    }

    /// Rewrite the matching step entry (or append it, on first sight).
    pub fn update_step(&self, execution_id: &str, step: StepStatus) {
        if let Some(mut entry) = self.states.get_mut(execution_id) {
            if let Some(existing) = entry.steps.iter_mut().find(|s| s.step_id == step.step_id) {
                *existing = step;
            } else {
                entry.steps.push(step);
            }
            entry.updated_at = Utc::now();
        }
    }

    pub fn get(&self, execution_id: &str) -> Option<ExecutionState> {
        self.states.get(execution_id).map(|e| e.clone())
    }

    pub fn get_status(&self, execution_id: &str) -> ExecutionStatusResult {
        match self.states.get(execution_id) {
            None => ExecutionStatusResult::not_found(),
            Some(state) => ExecutionStatusResult {
                found: true,
                status: Some(state.status),
                current_step: Some(state.current_step_index),
                steps: state.steps.clone(),
                progress: state.progress,
                tx_hash: state.tx_hash.clone(),
                receiving_tx_hash: state.receiving_tx_hash.clone(),
                error: state.error.clone(),
                recoverable: state.error.as_ref().map(|e| e.recoverable() && !is_non_recoverable_message(&e.to_string())),
                created_at: Some(state.created_at),
                updated_at: Some(state.updated_at),
            },
        }
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        let mut metrics = ExecutionMetrics::default();
        let mut completion_seconds = Vec::new();
        for entry in self.states.iter() {
            match entry.status {
                ExecutionStatus::Pending => metrics.pending += 1,
                ExecutionStatus::InProgress => metrics.in_progress += 1,
                ExecutionStatus::Completed => {
                    metrics.completed += 1;
                    completion_seconds.push((entry.updated_at - entry.created_at).num_milliseconds() as f64 / 1000.0);
                }
                ExecutionStatus::Failed => metrics.failed += 1,
            }
        }
        if !completion_seconds.is_empty() {
            metrics.avg_completion_seconds = Some(completion_seconds.iter().sum::<f64>() / completion_seconds.len() as f64);
        }
        metrics
    }

    /// Eviction per spec.md §3: at capacity, first evict terminal entries
    /// older than 1h; if still at capacity, evict the oldest quartile by
    /// `createdAt`.
    fn evict_if_at_capacity(&self) {
        if self.states.len() < REGISTRY_CAPACITY {
            return;
        }

        let cutoff = Utc::now() - chrono::Duration::seconds(REGISTRY_TERMINAL_EVICTION_AGE_SECS);
        let terminal_old: Vec<String> = self
            .states
            .iter()
            .filter(|e| e.status.is_terminal() && e.created_at < cutoff)
            .map(|e| e.execution_id.clone())
            .collect();
        for id in &terminal_old {
            self.remove(id);
        }

        if self.states.len() < REGISTRY_CAPACITY {
            return;
        }

        let order = self.created_order.lock().unwrap();
        let quartile = (order.len() / 4).max(1);
        let oldest: Vec<String> = order.values().take(quartile).cloned().collect();
        drop(order);
        for id in &oldest {
            self.remove(id);
        }
    }

    fn remove(&self, execution_id: &str) {
        self.states.remove(execution_id);
        self.created_order.lock().unwrap().retain(|_, v| v != execution_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn reset(&self) {
        self.states.clear();
        self.created_order.lock().unwrap().clear();
    }
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_initializes_pending_zero_progress() {
        let registry = ExecutionRegistry::new();
        let state = registry.create("exec-1", "quote-1", 2, "1000", 1, 999, 120);
        assert_eq!(state.status, ExecutionStatus::Pending);
        assert_eq!(state.progress, 0);
        assert_eq!(state.current_step_index, 0);
    }

    #[test]
    fn unknown_execution_id_projects_not_found() {
        let registry = ExecutionRegistry::new();
        let status = registry.get_status("nope");
        assert!(!status.found);
        assert!(status.steps.is_empty());
    }

    #[test]
    fn progress_is_monotonic_non_decreasing() {
        let registry = ExecutionRegistry::new();
        registry.create("exec-1", "quote-1", 1, "1000", 1, 999, 60);
        registry.update("exec-1", ExecutionPatch { progress: Some(50), ..Default::default() });
        registry.update("exec-1", ExecutionPatch { progress: Some(30), ..Default::default() });
        let state = registry.get("exec-1").unwrap();
        assert_eq!(state.progress, 50);
    }

    #[test]
    fn update_step_rewrites_matching_entry() {
        let registry = ExecutionRegistry::new();
        registry.create("exec-1", "quote-1", 1, "1000", 1, 999, 60);
        registry.update_step("exec-1", StepStatus {
            step_id: "step-1".into(),
            step: crate::types::StepType::Bridge,
            status: crate::types::StepStatusKind::Active,
            tx_hash: None,
            error: None,
            timestamp: Utc::now(),
        });
        registry.update_step("exec-1", StepStatus {
            step_id: "step-1".into(),
            step: crate::types::StepType::Bridge,
            status: crate::types::StepStatusKind::Completed,
            tx_hash: Some("0xabc".into()),
            error: None,
            timestamp: Utc::now(),
        });
        let state = registry.get("exec-1").unwrap();
        assert_eq!(state.steps.len(), 1);
        assert_eq!(state.steps[0].status, crate::types::StepStatusKind::Completed);
    }

    #[test]
    fn terminal_state_rejects_further_non_terminal_patches() {
        let registry = ExecutionRegistry::new();
        registry.create("exec-1", "quote-1", 1, "1000", 1, 999, 60);
        registry.update("exec-1", ExecutionPatch { status: Some(ExecutionStatus::Completed), progress: Some(100), ..Default::default() });
        registry.update("exec-1", ExecutionPatch { progress: Some(10), substatus: Some("retrying".into()), ..Default::default() });
        let state = registry.get("exec-1").unwrap();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert_eq!(state.progress, 100);
        assert_eq!(state.substatus, "pending");
    }

    #[test]
    fn recoverability_projection_uses_message_heuristic() {
        let registry = ExecutionRegistry::new();
        registry.create("exec-1", "quote-1", 1, "1000", 1, 999, 60);
        registry.update("exec-1", ExecutionPatch {
            status: Some(ExecutionStatus::Failed),
            error: Some(crate::error::BridgeError::UserRejected),
            ..Default::default()
        });
        let status = registry.get_status("exec-1");
        assert_eq!(status.recoverable, Some(false));
    }
}
