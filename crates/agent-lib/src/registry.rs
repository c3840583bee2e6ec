//! Registry of deployed benchmarks
//!
//! Maps benchmark name to its [`DeploymentRecord`]. The map sits behind one
//! lock so that the duplicate check and the insert of a reservation are a
//! single step. Each entry also owns an operation lock: whoever holds the
//! [`OperationGuard`] for a name is the only one mutating that benchmark's
//! containers (deploy, update, teardown).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use crate::models::{BenchmarkSpec, DeploymentRecord, DeploymentState};

/// Exclusive right to mutate one benchmark's containers
pub type OperationGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
struct Entry {
    record: DeploymentRecord,
    op_lock: Arc<Mutex<()>>,
}

/// Concurrency-safe store of deployment records
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRegistry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl BenchmarkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `CREATING` record for `spec` unless the name is taken.
    ///
    /// On success the caller also receives the record's operation guard,
    /// already held, so no other operation can slip in before the deploy.
    pub async fn try_reserve(&self, spec: BenchmarkSpec) -> Option<OperationGuard> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&spec.name) {
            return None;
        }

        let op_lock = Arc::new(Mutex::new(()));
        // Fresh mutex, nobody else can hold it yet
        let guard = op_lock.clone().try_lock_owned().ok()?;

        let name = spec.name.clone();
        entries.insert(
            name.clone(),
            Entry {
                record: DeploymentRecord::new(spec),
                op_lock,
            },
        );
        debug!(benchmark = %name, "Reserved benchmark name");
        Some(guard)
    }

    /// Acquire the operation guard for `name`, waiting for any in-flight
    /// deploy, update or teardown to finish. `None` if the name is unknown
    /// (or was removed while waiting).
    pub async fn lock(&self, name: &str) -> Option<OperationGuard> {
        loop {
            let op_lock = {
                let entries = self.entries.read().await;
                entries.get(name)?.op_lock.clone()
            };

            let guard = op_lock.clone().lock_owned().await;

            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(entry) if Arc::ptr_eq(&entry.op_lock, &op_lock) => return Some(guard),
                // Re-created under the same name while we waited
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Snapshot of one record
    pub async fn get(&self, name: &str) -> Option<DeploymentRecord> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|entry| entry.record.clone())
    }

    /// Snapshot of one record; a `FAILED` record is evicted once observed
    pub async fn observe(&self, name: &str) -> Option<DeploymentRecord> {
        let mut entries = self.entries.write().await;
        let record = entries.get(name)?.record.clone();
        if record.state == DeploymentState::Failed {
            entries.remove(name);
            debug!(benchmark = %name, "Evicted failed benchmark after observation");
        }
        Some(record)
    }

    /// Snapshot of all records, ordered by name
    pub async fn list_all(&self) -> BTreeMap<String, DeploymentRecord> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.record.clone()))
            .collect()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop the record regardless of its state
    pub async fn remove(&self, name: &str) -> Option<DeploymentRecord> {
        self.entries
            .write()
            .await
            .remove(name)
            .map(|entry| entry.record)
    }

    /// Move `name` to `state`, attaching `error` if given.
    ///
    /// Returns false if the record is absent or the transition would go
    /// backwards; the record is left untouched in both cases.
    pub async fn set_state(
        &self,
        name: &str,
        state: DeploymentState,
        error: Option<String>,
    ) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(name) else {
            return false;
        };

        let record = &mut entry.record;
        if !record.state.can_transition_to(state) {
            warn!(
                benchmark = %name,
                from = %record.state,
                to = %state,
                "Refusing non-monotonic state transition"
            );
            return false;
        }

        record.state = state;
        if error.is_some() {
            record.error = error;
        }
        record.updated_at = chrono::Utc::now().timestamp();
        true
    }

    /// Remember the runtime id of a freshly created replica
    pub async fn record_container(&self, name: &str, container_name: &str, id: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            entry
                .record
                .name_to_id
                .insert(container_name.to_string(), id.to_string());
        }
    }

    /// Forget a replica whose container is confirmed gone
    pub async fn forget_container(&self, name: &str, container_name: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            entry.record.name_to_id.remove(container_name);
        }
    }

    /// Store the intensity a deployed benchmark now runs at
    pub async fn set_intensity(&self, name: &str, intensity: u32) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            entry.record.benchmark.intensity = intensity;
            entry.record.updated_at = chrono::Utc::now().timestamp();
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of containers tracked across all records
    pub async fn container_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.record.name_to_id.len())
            .sum()
    }
}
