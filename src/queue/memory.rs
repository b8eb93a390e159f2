use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ensure_reportable, Broker, JobRecord, JobState, ResultBackend, StoreError, TaskMessage};

/// How long finished results are kept, matching a one day result expiry
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct Inner {
    queued: VecDeque<TaskMessage>,
    seen: HashSet<Uuid>,
    results: HashMap<Uuid, JobRecord>,
}

impl Inner {
    /// Forget finished jobs whose last update is older than `retention`
    fn expire(&mut self, retention: Duration) {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .results
            .values()
            .filter(|record| record.state.is_terminal())
            .filter(|record| {
                now.signed_duration_since(record.updated_at)
                    .to_std()
                    .is_ok_and(|age| age >= retention)
            })
            .map(|record| record.id)
            .collect();

        for id in &expired {
            self.results.remove(id);
            self.seen.remove(id);
        }
        if !expired.is_empty() {
            debug!("Expired {} finished jobs", expired.len());
        }
    }
}

/// In-process broker and result backend.
///
/// Only usable when the gateway and the workers share a process, which makes
/// it a fit for tests and single-process deployments. Finished jobs are
/// forgotten after the retention period, after which their ids read as
/// pending again.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    retention: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retention,
        }
    }

    /// Number of messages waiting to be claimed
    pub fn queued_len(&self) -> usize {
        self.lock().queued.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Broker for MemoryStore {
    async fn enqueue(&self, message: &TaskMessage) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.seen.insert(message.id) {
            return Err(StoreError::DuplicateJob(message.id));
        }
        inner.queued.push_back(message.clone());
        debug!("Enqueued job {} on queue {}", message.id, message.queue);
        Ok(())
    }

    async fn claim(&self, queues: &[String]) -> Result<Option<TaskMessage>, StoreError> {
        let mut inner = self.lock();
        let position = inner
            .queued
            .iter()
            .position(|message| queues.iter().any(|queue| *queue == message.queue));
        Ok(position.and_then(|index| inner.queued.remove(index)))
    }

    async fn contains(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.lock().seen.contains(&id))
    }
}

#[async_trait]
impl ResultBackend for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock().results.get(&id).cloned())
    }

    async fn store(
        &self,
        id: Uuid,
        state: JobState,
        info: Option<serde_json::Value>,
    ) -> Result<bool, StoreError> {
        ensure_reportable(id, &state)?;

        let mut inner = self.lock();
        inner.expire(self.retention);

        if let Some(current) = inner.results.get(&id) {
            if !current.state.can_transition_to(&state) {
                warn!(
                    "Ignoring {} for job {}: already {}",
                    state, id, current.state
                );
                return Ok(false);
            }
        }

        inner.results.insert(
            id,
            JobRecord {
                id,
                state,
                info,
                updated_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
