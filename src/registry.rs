//! Bounded set of active polling tasks.
//!
//! The registry owns every [`TaskWorker`]. All lifecycle operations run under
//! one lock, so `add_task`, `remove_task` and `teardown_all` never interleave.
//! Workers never take that lock themselves; stopping and joining them while
//! holding it cannot deadlock.
//!
//! Ids come from an ordered free list: a new task always receives the
//! smallest free id, and removed ids go back to the list.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{SendError, Sender};
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{RejectReason, S7Error, Result};
use crate::events::TaskEvent;
use crate::marshal::Marshaller;
use crate::task::{AcquisitionSignature, Task};
use crate::worker::TaskWorker;

/// Default number of task slots.
pub const DEFAULT_MAX_TASKS: u8 = 10;
/// Smallest accepted polling interval in milliseconds.
pub const MIN_INTERVAL_MS: u64 = 1;
/// Default largest accepted polling interval in milliseconds.
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 100_000;

/// Admission limits for new tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskLimits {
    /// Number of task slots; ids run from 1 to this value.
    pub max_tasks: u8,
    /// Smallest accepted interval.
    pub min_interval_ms: u64,
    /// Largest accepted interval.
    pub max_interval_ms: u64,
}

impl TaskLimits {
    /// Checks that the limits can admit at least one task.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for zero task slots, a minimum interval below
    /// [`MIN_INTERVAL_MS`], or a minimum above the maximum.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_poll::TaskLimits;
    ///
    /// assert!(TaskLimits::default().validate().is_ok());
    ///
    /// let spinning = TaskLimits { min_interval_ms: 0, ..TaskLimits::default() };
    /// assert!(spinning.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.max_tasks == 0 {
            return Err(S7Error::invalid_parameter(
                "max_tasks",
                "at least one task slot is required",
            ));
        }
        if self.min_interval_ms < MIN_INTERVAL_MS {
            return Err(S7Error::invalid_parameter(
                "min_interval_ms",
                format!("must be at least {MIN_INTERVAL_MS}"),
            ));
        }
        if self.min_interval_ms > self.max_interval_ms {
            return Err(S7Error::invalid_parameter(
                "max_interval_ms",
                format!(
                    "{} is below the minimum interval {}",
                    self.max_interval_ms, self.min_interval_ms
                ),
            ));
        }
        Ok(())
    }
}

impl Default for TaskLimits {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            min_interval_ms: MIN_INTERVAL_MS,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
        }
    }
}

struct Entry {
    signature: AcquisitionSignature,
    interval_ms: u64,
    worker: TaskWorker,
}

impl Entry {
    fn snapshot(&self, id: u8) -> Task {
        Task {
            id,
            signature: self.signature,
            interval_ms: self.interval_ms,
            execution_count: self.worker.execution_count(),
        }
    }
}

struct RegistryState {
    active: BTreeMap<u8, Entry>,
    free_ids: BTreeSet<u8>,
}

impl RegistryState {
    fn new(max_tasks: u8) -> Self {
        Self {
            active: BTreeMap::new(),
            free_ids: (1..=max_tasks).collect(),
        }
    }
}

/// Registry of polling tasks sharing one connection.
///
/// # Example
///
/// ```
/// use s7_poll::{
///     AcquisitionSignature, Address, Endpoint, Marshaller, MemoryArea, ResultAggregator,
///     SharedConnection, SimulatedPlc, TaskLimits, TaskRegistry, ValueType,
/// };
///
/// let conn = SharedConnection::new(SimulatedPlc::new());
/// conn.connect(&Endpoint::new("192.168.0.16", 0, 1))?;
/// let (tx, _aggregator) = ResultAggregator::channel();
/// let registry = TaskRegistry::new(Marshaller::new(conn), tx, TaskLimits::default())?;
///
/// let sig = AcquisitionSignature::new(
///     MemoryArea::DataBlock,
///     1,
///     Address::byte(18),
///     ValueType::Int16,
/// )?;
/// let task = registry.add_task(sig, 500)?;
/// assert_eq!(task.id, 1);
/// assert!(registry.add_task(sig, 1000).is_err());
///
/// registry.remove_task(1)?;
/// assert!(registry.is_empty());
/// # Ok::<(), s7_poll::S7Error>(())
/// ```
pub struct TaskRegistry {
    marshaller: Marshaller,
    events: Sender<TaskEvent>,
    limits: TaskLimits,
    state: Mutex<RegistryState>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `limits` is unusable (see [`TaskLimits::validate`]).
    pub fn new(
        marshaller: Marshaller,
        events: Sender<TaskEvent>,
        limits: TaskLimits,
    ) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            marshaller,
            events,
            state: Mutex::new(RegistryState::new(limits.max_tasks)),
            limits,
        })
    }

    /// Registers a task and starts its worker.
    ///
    /// Checks run in order: interval range, duplicate signature, capacity.
    /// The first failing check is reported and nothing changes.
    ///
    /// # Errors
    ///
    /// `Rejected` with the reason, or `Io` if the worker thread cannot be
    /// spawned (the id is returned to the free list).
    pub fn add_task(&self, signature: AcquisitionSignature, interval_ms: u64) -> Result<Task> {
        let mut state = self.state.lock();

        let id = match self.admit(&mut state, &signature, interval_ms) {
            Ok(id) => id,
            Err(reason) => {
                warn!("task {signature} rejected: {reason}");
                self.emit(TaskEvent::Rejected(reason.clone()));
                return Err(reason.into());
            }
        };

        let mut worker = TaskWorker::new(
            id,
            signature,
            Duration::from_millis(interval_ms),
            self.marshaller.clone(),
            self.events.clone(),
        );
        if let Err(e) = worker.start() {
            state.free_ids.insert(id);
            warn!("task {id} could not start: {e}");
            return Err(e);
        }

        let entry = Entry {
            signature,
            interval_ms,
            worker,
        };
        let task = entry.snapshot(id);
        state.active.insert(id, entry);

        info!("{task} started");
        self.emit(TaskEvent::Added(task.clone()));
        Ok(task)
    }

    /// Runs the admission checks and takes the smallest free id.
    fn admit(
        &self,
        state: &mut RegistryState,
        signature: &AcquisitionSignature,
        interval_ms: u64,
    ) -> std::result::Result<u8, RejectReason> {
        let TaskLimits {
            min_interval_ms,
            max_interval_ms,
            ..
        } = self.limits;
        if !(min_interval_ms..=max_interval_ms).contains(&interval_ms) {
            return Err(RejectReason::InvalidInterval {
                interval_ms,
                min: min_interval_ms,
                max: max_interval_ms,
            });
        }

        if let Some((&existing_id, _)) = state
            .active
            .iter()
            .find(|(_, entry)| entry.signature == *signature)
        {
            return Err(RejectReason::DuplicateSignature { existing_id });
        }

        debug_assert_eq!(state.active.len() + state.free_ids.len(), self.capacity());
        state
            .free_ids
            .pop_first()
            .ok_or(RejectReason::CapacityExceeded {
                capacity: self.capacity(),
            })
    }

    fn emit(&self, event: TaskEvent) {
        if let Err(SendError(event)) = self.events.send(event) {
            debug!("no event consumer, dropped: {event}");
        }
    }

    /// Stops a task's worker, waits for its thread to exit and frees its id.
    ///
    /// Returns the final snapshot of the task.
    ///
    /// # Errors
    ///
    /// `TaskNotFound` if no active task has this id.
    pub fn remove_task(&self, id: u8) -> Result<Task> {
        let mut state = self.state.lock();
        let mut entry = state
            .active
            .remove(&id)
            .ok_or(S7Error::TaskNotFound { id })?;

        entry.worker.stop();
        state.free_ids.insert(id);
        let task = entry.snapshot(id);

        info!("{task} removed");
        self.emit(TaskEvent::Removed { task_id: id });
        Ok(task)
    }

    /// Stops every worker, clears all tasks and resets the free list.
    ///
    /// No task can be added while this runs. Returns how many tasks were
    /// stopped.
    pub fn teardown_all(&self) -> usize {
        let mut state = self.state.lock();
        let mut stopped = std::mem::take(&mut state.active);

        // signal all first so the workers wind down in parallel
        for entry in stopped.values_mut() {
            entry.worker.request_stop();
        }
        for entry in stopped.values_mut() {
            entry.worker.stop();
        }
        *state = RegistryState::new(self.limits.max_tasks);

        let count = stopped.len();
        if count > 0 {
            info!("teardown stopped {count} task(s)");
        }
        self.emit(TaskEvent::TornDown { stopped: count });
        count
    }

    /// Snapshot of active tasks in id order.
    pub fn tasks(&self) -> Vec<Task> {
        let state = self.state.lock();
        state
            .active
            .iter()
            .map(|(&id, entry)| entry.snapshot(id))
            .collect()
    }

    /// Snapshot of one active task.
    pub fn get(&self, id: u8) -> Option<Task> {
        self.state.lock().active.get(&id).map(|entry| entry.snapshot(id))
    }

    /// Number of active tasks.
    pub fn len(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Returns `true` when no task is active.
    pub fn is_empty(&self) -> bool {
        self.state.lock().active.is_empty()
    }

    /// Free ids in ascending order.
    pub fn free_ids(&self) -> Vec<u8> {
        self.state.lock().free_ids.iter().copied().collect()
    }

    /// Number of task slots.
    pub fn capacity(&self) -> usize {
        usize::from(self.limits.max_tasks)
    }

    /// Admission limits.
    pub fn limits(&self) -> TaskLimits {
        self.limits
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for entry in state.active.values_mut() {
            entry.worker.request_stop();
        }
        state.active.clear();
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("limits", &self.limits)
            .field("active", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::connection::{Endpoint, SharedConnection};
    use crate::events::ResultAggregator;
    use crate::memory::MemoryArea;
    use crate::simulator::SimulatedPlc;
    use crate::value::ValueType;
    use std::thread;

    fn registry(plc: &SimulatedPlc) -> (TaskRegistry, ResultAggregator) {
        let conn = SharedConnection::new(plc.clone());
        conn.connect(&Endpoint::new("sim", 0, 1)).unwrap();
        let (tx, agg) = ResultAggregator::channel();
        (
            TaskRegistry::new(Marshaller::new(conn), tx, TaskLimits::default()).unwrap(),
            agg,
        )
    }

    fn sig(offset: u32) -> AcquisitionSignature {
        AcquisitionSignature::new(
            MemoryArea::DataBlock,
            1,
            Address::byte(offset),
            ValueType::Int16,
        )
        .unwrap()
    }

    fn rejection(result: Result<Task>) -> RejectReason {
        match result {
            Err(S7Error::Rejected(reason)) => reason,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_capacity_and_id_reuse() {
        let plc = SimulatedPlc::new();
        let (reg, _agg) = registry(&plc);

        for i in 0..10u8 {
            let task = reg.add_task(sig(u32::from(i) * 2), 50_000).unwrap();
            assert_eq!(task.id, i + 1);
        }
        assert_eq!(
            rejection(reg.add_task(sig(100), 50_000)),
            RejectReason::CapacityExceeded { capacity: 10 }
        );
        assert_eq!(reg.len(), 10);
        assert!(reg.free_ids().is_empty());

        reg.remove_task(3).unwrap();
        assert_eq!(reg.free_ids(), vec![3]);
        let task = reg.add_task(sig(100), 50_000).unwrap();
        assert_eq!(task.id, 3);
    }

    #[test]
    fn test_smallest_free_id_first() {
        let plc = SimulatedPlc::new();
        let (reg, _agg) = registry(&plc);
        for i in 0..5 {
            reg.add_task(sig(i * 2), 50_000).unwrap();
        }
        reg.remove_task(4).unwrap();
        reg.remove_task(2).unwrap();
        assert_eq!(reg.add_task(sig(40), 50_000).unwrap().id, 2);
        assert_eq!(reg.add_task(sig(42), 50_000).unwrap().id, 4);
        assert_eq!(reg.add_task(sig(44), 50_000).unwrap().id, 6);
    }

    #[test]
    fn test_duplicate_signature_ignores_interval() {
        let plc = SimulatedPlc::new();
        let (reg, _agg) = registry(&plc);
        reg.add_task(sig(18), 500).unwrap();
        assert_eq!(
            rejection(reg.add_task(sig(18), 1000)),
            RejectReason::DuplicateSignature { existing_id: 1 }
        );
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.free_ids(), (2..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_interval_bounds() {
        let plc = SimulatedPlc::new();
        let (reg, mut agg) = registry(&plc);
        assert!(matches!(
            rejection(reg.add_task(sig(0), 0)),
            RejectReason::InvalidInterval { interval_ms: 0, .. }
        ));
        assert!(matches!(
            rejection(reg.add_task(sig(0), 100_001)),
            RejectReason::InvalidInterval { interval_ms: 100_001, .. }
        ));
        assert!(reg.is_empty());
        assert_eq!(reg.add_task(sig(0), 100_000).unwrap().id, 1);

        let rejected = agg
            .drain()
            .into_iter()
            .filter(|e| matches!(e, TaskEvent::Rejected(_)))
            .count();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_remove_unknown() {
        let plc = SimulatedPlc::new();
        let (reg, _agg) = registry(&plc);
        assert!(matches!(reg.remove_task(4), Err(S7Error::TaskNotFound { id: 4 })));
    }

    #[test]
    fn test_teardown_stops_everything() {
        let plc = SimulatedPlc::new();
        let (reg, mut agg) = registry(&plc);
        for i in 0..5 {
            reg.add_task(sig(i * 2), 2).unwrap();
        }
        thread::sleep(Duration::from_millis(30));

        assert_eq!(reg.teardown_all(), 5);
        assert!(reg.is_empty());
        assert_eq!(reg.free_ids(), (1..=10).collect::<Vec<u8>>());

        let events = agg.drain();
        assert_eq!(events.last(), Some(&TaskEvent::TornDown { stopped: 5 }));
        let finished = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::Finished { .. }))
            .count();
        assert_eq!(finished, 5);

        let calls = plc.call_count();
        thread::sleep(Duration::from_millis(30));
        assert!(agg.drain().is_empty());
        assert_eq!(plc.call_count(), calls);
    }

    #[test]
    fn test_removed_after_finished() {
        let plc = SimulatedPlc::new();
        let (reg, mut agg) = registry(&plc);
        reg.add_task(sig(0), 50_000).unwrap();
        reg.remove_task(1).unwrap();

        let events = agg.drain();
        let tail: Vec<_> = events.iter().rev().take(2).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                TaskEvent::Finished { task_id: 1 },
                TaskEvent::Removed { task_id: 1 }
            ]
        );
    }

    #[test]
    fn test_ticks_count_through_failures() {
        let plc = SimulatedPlc::new();
        plc.fail_reads(true);
        let (reg, _agg) = registry(&plc);
        reg.add_task(sig(0), 2).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(reg.get(1).unwrap().execution_count > 0);
        reg.teardown_all();
    }

    #[test]
    fn test_workers_never_overlap_on_connection() {
        let plc = SimulatedPlc::new();
        plc.set_latency(Duration::from_millis(1));
        let (reg, _agg) = registry(&plc);
        for i in 0..10 {
            reg.add_task(sig(i * 2), 1).unwrap();
        }
        thread::sleep(Duration::from_millis(60));
        reg.teardown_all();
        assert!(plc.call_count() > 10);
        assert!(!plc.overlap_detected());
    }

    #[test]
    fn test_unusable_limits_rejected() {
        let plc = SimulatedPlc::new();
        let defaults = TaskLimits::default();
        for limits in [
            TaskLimits {
                min_interval_ms: 0,
                ..defaults
            },
            TaskLimits {
                min_interval_ms: 500,
                max_interval_ms: 100,
                ..defaults
            },
            TaskLimits {
                max_tasks: 0,
                ..defaults
            },
        ] {
            let (tx, _agg) = ResultAggregator::channel();
            let conn = SharedConnection::new(plc.clone());
            assert!(matches!(
                TaskRegistry::new(Marshaller::new(conn), tx, limits),
                Err(S7Error::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_adds_racing_teardown_keep_ids_consistent() {
        let plc = SimulatedPlc::new();
        plc.set_latency(Duration::from_millis(1));
        let (reg, _agg) = registry(&plc);

        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..40 {
                    let _ = reg.add_task(sig(i * 2), 1);
                }
            });
            for _ in 0..10 {
                reg.teardown_all();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let mut ids: Vec<u8> = reg.tasks().iter().map(|t| t.id).collect();
        ids.extend(reg.free_ids());
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<u8>>());

        reg.teardown_all();
        assert!(reg.is_empty());
        let calls = plc.call_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(plc.call_count(), calls);
    }
}
