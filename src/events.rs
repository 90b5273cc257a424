//! Task events and the single-consumer result aggregator.
//!
//! Workers and the registry only ever *send* [`TaskEvent`]s; nothing they do
//! waits on the consumer. [`ResultAggregator`] owns the receiving end, applies
//! events in arrival order and keeps the state a presentation layer shows:
//! latest execution count and message per task, plus a rolling log.
//!
//! # Example
//!
//! ```
//! use s7_poll::{ResultAggregator, TaskEvent};
//!
//! let (tx, mut aggregator) = ResultAggregator::channel();
//! tx.send(TaskEvent::Tick {
//!     task_id: 2,
//!     message: "Int16 offset 18 value 42".into(),
//!     execution_count: 1,
//! })
//! .unwrap();
//!
//! aggregator.drain();
//! assert_eq!(aggregator.execution_count(2), Some(1));
//! let last = aggregator.log_lines().back().map(String::as_str);
//! assert_eq!(last, Some("Task 2: Int16 offset 18 value 42"));
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::error::RejectReason;
use crate::task::Task;

/// Default number of log lines kept by the aggregator.
pub const DEFAULT_LOG_LIMIT: usize = 1000;

/// Something that happened to a polling task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was registered and its worker started.
    Added(Task),
    /// A task was removed; its worker has fully stopped.
    Removed {
        /// Id that is free again.
        task_id: u8,
    },
    /// One tick completed.
    Tick {
        /// Reporting task.
        task_id: u8,
        /// Status line with offset, bit offset (if any) and value.
        message: String,
        /// Execution count after this tick.
        execution_count: u64,
    },
    /// A worker left its tick loop.
    Finished {
        /// Task whose worker stopped.
        task_id: u8,
    },
    /// An add request was refused.
    Rejected(RejectReason),
    /// All tasks were stopped at once (connection dropped).
    TornDown {
        /// Number of tasks that were running.
        stopped: usize,
    },
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskEvent::Added(task) => write!(f, "Task added: {task}"),
            TaskEvent::Removed { task_id } => write!(f, "Task {task_id} stopped"),
            TaskEvent::Tick {
                task_id, message, ..
            } => write!(f, "Task {task_id}: {message}"),
            TaskEvent::Finished { task_id } => write!(f, "Task {task_id} finished"),
            TaskEvent::Rejected(reason) => write!(f, "Task rejected: {reason}"),
            TaskEvent::TornDown { stopped } => {
                write!(f, "Connection dropped, {stopped} task(s) stopped and cleared")
            }
        }
    }
}

/// Single consumer of [`TaskEvent`]s.
#[derive(Debug)]
pub struct ResultAggregator {
    rx: Receiver<TaskEvent>,
    counts: BTreeMap<u8, u64>,
    last_messages: BTreeMap<u8, String>,
    log: VecDeque<String>,
    log_limit: usize,
}

impl ResultAggregator {
    /// Wraps the receiving end of an event channel.
    pub fn new(rx: Receiver<TaskEvent>) -> Self {
        Self {
            rx,
            counts: BTreeMap::new(),
            last_messages: BTreeMap::new(),
            log: VecDeque::new(),
            log_limit: DEFAULT_LOG_LIMIT,
        }
    }

    /// Creates a channel and an aggregator on its receiving end.
    pub fn channel() -> (Sender<TaskEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }

    /// Sets how many log lines are retained; older lines are dropped first.
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit;
        self.trim_log();
        self
    }

    /// Applies every event already queued, without blocking, and returns them
    /// in arrival order.
    pub fn drain(&mut self) -> Vec<TaskEvent> {
        let mut drained = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                    drained.push(event);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        drained
    }

    /// Waits up to `timeout` for the next event and applies it.
    ///
    /// Returns `None` on timeout or when every sender is gone.
    pub fn next_event(&mut self, timeout: Duration) -> Option<TaskEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(&event);
                Some(event)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Latest reported execution count of an active task.
    pub fn execution_count(&self, task_id: u8) -> Option<u64> {
        self.counts.get(&task_id).copied()
    }

    /// Latest tick message of an active task.
    pub fn last_message(&self, task_id: u8) -> Option<&str> {
        self.last_messages.get(&task_id).map(String::as_str)
    }

    /// Ids the aggregator currently considers active.
    pub fn active_ids(&self) -> Vec<u8> {
        self.counts.keys().copied().collect()
    }

    /// Retained log lines, oldest first.
    pub fn log_lines(&self) -> &VecDeque<String> {
        &self.log
    }

    /// Drops all retained log lines.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn apply(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Added(task) => {
                self.counts.insert(task.id, task.execution_count);
            }
            TaskEvent::Tick {
                task_id,
                message,
                execution_count,
            } => {
                self.counts.insert(*task_id, *execution_count);
                self.last_messages.insert(*task_id, message.clone());
            }
            TaskEvent::Removed { task_id } => {
                self.counts.remove(task_id);
                self.last_messages.remove(task_id);
            }
            TaskEvent::TornDown { .. } => {
                self.counts.clear();
                self.last_messages.clear();
            }
            TaskEvent::Finished { .. } | TaskEvent::Rejected(_) => {}
        }
        self.log.push_back(event.to_string());
        self.trim_log();
    }

    fn trim_log(&mut self) {
        while self.log.len() > self.log_limit {
            self.log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::memory::MemoryArea;
    use crate::task::AcquisitionSignature;
    use crate::value::ValueType;

    fn task(id: u8) -> Task {
        Task {
            id,
            signature: AcquisitionSignature::new(
                MemoryArea::DataBlock,
                1,
                Address::byte(18),
                ValueType::Int16,
            )
            .unwrap(),
            interval_ms: 100,
            execution_count: 0,
        }
    }

    fn tick(task_id: u8, n: u64) -> TaskEvent {
        TaskEvent::Tick {
            task_id,
            message: format!("Int16 offset 18 value {n}"),
            execution_count: n,
        }
    }

    #[test]
    fn test_counts_follow_ticks() {
        let (tx, mut agg) = ResultAggregator::channel();
        tx.send(TaskEvent::Added(task(1))).unwrap();
        tx.send(tick(1, 1)).unwrap();
        tx.send(tick(1, 2)).unwrap();

        assert_eq!(agg.drain().len(), 3);
        assert_eq!(agg.execution_count(1), Some(2));
        assert_eq!(agg.last_message(1), Some("Int16 offset 18 value 2"));
    }

    #[test]
    fn test_removed_and_torn_down_clear_state() {
        let (tx, mut agg) = ResultAggregator::channel();
        tx.send(TaskEvent::Added(task(1))).unwrap();
        tx.send(TaskEvent::Added(task(2))).unwrap();
        tx.send(TaskEvent::Removed { task_id: 1 }).unwrap();
        agg.drain();
        assert_eq!(agg.active_ids(), vec![2]);

        tx.send(TaskEvent::TornDown { stopped: 1 }).unwrap();
        agg.drain();
        assert!(agg.active_ids().is_empty());
        assert_eq!(
            agg.log_lines().back().unwrap(),
            "Connection dropped, 1 task(s) stopped and cleared"
        );
    }

    #[test]
    fn test_log_limit() {
        let (tx, agg) = ResultAggregator::channel();
        let mut agg = agg.with_log_limit(2);
        for n in 1..=5 {
            tx.send(tick(4, n)).unwrap();
        }
        agg.drain();
        let lines: Vec<_> = agg.log_lines().iter().cloned().collect();
        assert_eq!(
            lines,
            vec![
                "Task 4: Int16 offset 18 value 4".to_string(),
                "Task 4: Int16 offset 18 value 5".to_string()
            ]
        );
        agg.clear_log();
        assert!(agg.log_lines().is_empty());
    }

    #[test]
    fn test_next_event_timeout() {
        let (tx, mut agg) = ResultAggregator::channel();
        assert!(agg.next_event(Duration::from_millis(5)).is_none());
        tx.send(TaskEvent::Finished { task_id: 9 }).unwrap();
        assert_eq!(
            agg.next_event(Duration::from_millis(5)),
            Some(TaskEvent::Finished { task_id: 9 })
        );
    }

    #[test]
    fn test_rejected_display() {
        let event = TaskEvent::Rejected(RejectReason::DuplicateSignature { existing_id: 4 });
        assert_eq!(
            event.to_string(),
            "Task rejected: an identical task is already running as task 4"
        );
    }
}
