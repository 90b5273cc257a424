//! Per-task periodic worker.
//!
//! Each [`TaskWorker`] owns one OS thread that wakes every interval, performs
//! exactly one typed read through the shared connection and reports the
//! result. The thread waits on its stop channel between ticks, so a stop
//! request is seen before the next tick fires.
//!
//! Lifecycle: `Idle → Running → Stopped`. A stopped worker is discarded,
//! never restarted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SendError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{S7Error, Result};
use crate::events::TaskEvent;
use crate::marshal::{Marshaller, Reading};
use crate::task::{tick_message, AcquisitionSignature};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, thread not started.
    Idle,
    /// Tick loop running.
    Running,
    /// Tick loop has terminated. Terminal.
    Stopped,
}

/// Everything the tick loop needs, moved into the worker thread.
struct TickContext {
    task_id: u8,
    signature: AcquisitionSignature,
    marshaller: Marshaller,
    events: Sender<TaskEvent>,
    executions: Arc<AtomicU64>,
}

impl TickContext {
    fn tick(&self) {
        let sig = &self.signature;
        let reading = self
            .marshaller
            .read_or_default(sig.area(), sig.block(), sig.address(), sig.value_type())
            .unwrap_or_else(|_| Reading {
                value: sig.value_type().default_value(),
                ok: false,
            });

        // counted whether or not the read succeeded
        let count = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        let message = tick_message(sig, &reading.value);
        debug!("task {} tick {count}: {message}", self.task_id);

        self.emit(TaskEvent::Tick {
            task_id: self.task_id,
            message,
            execution_count: count,
        });
    }

    fn emit(&self, event: TaskEvent) {
        if let Err(SendError(event)) = self.events.send(event) {
            debug!("task {} has no event consumer, dropped: {event}", self.task_id);
        }
    }

    fn run(self, interval: Duration, stop_rx: mpsc::Receiver<()>) {
        let mut next = Instant::now() + interval;
        loop {
            let wait = next.saturating_duration_since(Instant::now());
            match stop_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            self.tick();

            next += interval;
            let now = Instant::now();
            if next < now {
                // a slow tick overran one or more periods; skip them
                next = now + interval;
            }
        }

        debug!("task {} worker finished", self.task_id);
        self.emit(TaskEvent::Finished {
            task_id: self.task_id,
        });
    }
}

/// Periodic reader for one polling task.
pub struct TaskWorker {
    task_id: u8,
    interval: Duration,
    state: WorkerState,
    context: Option<TickContext>,
    executions: Arc<AtomicU64>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TaskWorker {
    /// Creates an idle worker.
    pub fn new(
        task_id: u8,
        signature: AcquisitionSignature,
        interval: Duration,
        marshaller: Marshaller,
        events: Sender<TaskEvent>,
    ) -> Self {
        let executions = Arc::new(AtomicU64::new(0));
        Self {
            task_id,
            interval,
            state: WorkerState::Idle,
            context: Some(TickContext {
                task_id,
                signature,
                marshaller,
                events,
                executions: Arc::clone(&executions),
            }),
            executions,
            stop_tx: None,
            handle: None,
        }
    }

    /// Starts the tick loop on its own thread. The first tick fires one
    /// interval after this call.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a zero interval, `WorkerStopped` if
    /// the worker already ran, or `Io` if the thread cannot be spawned (the
    /// worker then counts as stopped).
    pub fn start(&mut self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(S7Error::invalid_parameter("interval", "must be at least 1 ms"));
        }
        let context = match (self.state, self.context.take()) {
            (WorkerState::Idle, Some(context)) => context,
            _ => return Err(S7Error::WorkerStopped { id: self.task_id }),
        };

        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name(format!("s7-task-{}", self.task_id))
            .spawn(move || context.run(interval, stop_rx));

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                self.state = WorkerState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = WorkerState::Stopped;
                Err(e.into())
            }
        }
    }

    /// Asks the tick loop to exit without waiting for it.
    pub(crate) fn request_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    /// Stops the tick loop and waits until the thread has exited.
    ///
    /// Once this returns no further tick is reported. Calling it again, or on
    /// a worker that never started, only marks it stopped.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("task {} worker panicked", self.task_id);
            }
        }
        self.context = None;
        self.state = WorkerState::Stopped;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Ticks performed so far.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TaskWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("task_id", &self.task_id)
            .field("interval", &self.interval)
            .field("state", &self.state)
            .field("execution_count", &self.execution_count())
            .finish()
    }
}
