//! Background task scheduler.
//!
//! A fixed pool of worker threads pulls from one priority queue. Higher
//! priority runs first; within a priority tasks run in submission order.
//! Every task receives a [`CancellationToken`]. A task cancelled before a
//! worker picks it up never runs; a running task observes the token and
//! stops early on its own terms.
//!
//! Keyed tasks supersede each other: starting a task under a key cancels
//! the previous task registered under the same key.

use framestore_core::Error;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Priority levels for background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Pre-rendering, statistics warm-up
    Low = 0,
    /// Columnar rebuilds
    Medium = 1,
    /// Index builds, renders a caller is waiting on
    High = 2,
}

/// Error returned when a task cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackpressureError {
    /// Queue is at `max_queue_depth`
    #[error("background queue is full ({depth} tasks)")]
    QueueFull {
        /// Depth at rejection time
        depth: usize,
    },
    /// Scheduler has been shut down
    #[error("background scheduler is shut down")]
    ShutDown,
}

impl From<BackpressureError> for Error {
    fn from(e: BackpressureError) -> Self {
        Error::CapacityExceeded(e.to_string())
    }
}

/// Cooperative cancellation flag shared between a task and its handle.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::Acquire)
    }

    fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ran to completion
    Completed,
    /// Skipped before starting, or observed cancellation while running
    Cancelled,
    /// Panicked; the panic was caught and logged
    Panicked,
}

#[derive(Default)]
struct Completion {
    outcome: Mutex<Option<TaskOutcome>>,
    done: Condvar,
}

impl Completion {
    fn finish(&self, outcome: TaskOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }
}

/// Handle to a queued or running task.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    name: Arc<str>,
    token: CancellationToken,
    completion: Arc<Completion>,
}

impl TaskHandle {
    /// Scheduler-unique task id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name given at submission.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Outcome, once the task has ended.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        *self.completion.outcome.lock()
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }

    /// Block until the task ends.
    pub fn wait(&self) -> TaskOutcome {
        let mut outcome = self.completion.outcome.lock();
        loop {
            if let Some(o) = *outcome {
                return o;
            }
            self.completion.done.wait(&mut outcome);
        }
    }

    /// Block until the task ends or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskOutcome> {
        let mut outcome = self.completion.outcome.lock();
        if outcome.is_none() {
            self.completion.done.wait_for(&mut outcome, timeout);
        }
        *outcome
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cancelled", &self.is_cancelled())
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Scheduler metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Number of tasks waiting in the queue.
    pub queue_depth: usize,
    /// Number of tasks currently being executed by workers.
    pub active_tasks: usize,
    /// Tasks that ran to completion.
    pub tasks_completed: u64,
    /// Tasks skipped or stopped by cancellation.
    pub tasks_cancelled: u64,
    /// Tasks that panicked.
    pub tasks_panicked: u64,
    /// Number of worker threads.
    pub worker_count: usize,
}

type Work = Box<dyn FnOnce(&CancellationToken) + Send>;

/// One member of a group queued with
/// [`BackgroundScheduler::start_keyed_group`].
pub struct KeyedTask {
    key: String,
    name: String,
    priority: TaskPriority,
    work: Work,
}

impl KeyedTask {
    /// Describe a keyed task without queueing it.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        priority: TaskPriority,
        work: impl FnOnce(&CancellationToken) + Send + 'static,
    ) -> Self {
        KeyedTask {
            key: key.into(),
            name: name.into(),
            priority,
            work: Box::new(work),
        }
    }
}

struct TaskEnvelope {
    priority: TaskPriority,
    sequence: u64,
    name: Arc<str>,
    key: Option<String>,
    token: CancellationToken,
    completion: Arc<Completion>,
    work: Work,
}

impl Eq for TaskEnvelope {}

impl PartialEq for TaskEnvelope {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

// Higher priority first, then lower sequence (older) first
impl Ord for TaskEnvelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TaskEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct SchedulerInner {
    queue: Mutex<BinaryHeap<TaskEnvelope>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    sequence: AtomicU64,
    queue_depth: AtomicUsize,
    active_tasks: AtomicUsize,
    max_queue_depth: usize,
    tasks_completed: AtomicU64,
    tasks_cancelled: AtomicU64,
    tasks_panicked: AtomicU64,
    keyed: Mutex<FxHashMap<String, CancellationToken>>,
}

/// Priority scheduler over a fixed worker pool.
pub struct BackgroundScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl BackgroundScheduler {
    /// Create a scheduler with `num_threads` workers (at least one).
    ///
    /// Workers are named `framestore-bg-0`, `framestore-bg-1`, etc.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> io::Result<Self> {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(BinaryHeap::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            max_queue_depth,
            tasks_completed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            keyed: Mutex::new(FxHashMap::default()),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&inner);
            let spawned = std::thread::Builder::new()
                .name(format!("framestore-bg-{}", i))
                .spawn(move || worker_loop(&inner_clone));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Stop the workers already running before bailing out.
                    inner.shutdown.store(true, AtomicOrdering::Release);
                    {
                        let _queue = inner.queue.lock();
                        inner.work_ready.notify_all();
                    }
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            num_threads,
        })
    }

    /// Queue a task.
    ///
    /// Returns `Err(BackpressureError)` if the queue is at capacity or
    /// the scheduler has been shut down.
    pub fn start_task(
        &self,
        name: &str,
        priority: TaskPriority,
        work: impl FnOnce(&CancellationToken) + Send + 'static,
    ) -> Result<TaskHandle, BackpressureError> {
        self.enqueue(name, None, priority, CancellationToken::new(), Box::new(work))
    }

    /// Queue a task under `key`, cancelling whatever was registered there.
    pub fn start_keyed_task(
        &self,
        key: &str,
        name: &str,
        priority: TaskPriority,
        work: impl FnOnce(&CancellationToken) + Send + 'static,
    ) -> Result<TaskHandle, BackpressureError> {
        let token = CancellationToken::new();
        // Register before queueing so a fast task can clear its own entry.
        if let Some(previous) = self.inner.keyed.lock().insert(key.to_string(), token.clone()) {
            previous.cancel();
            debug!(target: "framestore::bg", key, "Superseded keyed task");
        }
        let queued = self.enqueue(
            name,
            Some(key.to_string()),
            priority,
            token.clone(),
            Box::new(work),
        );
        if queued.is_err() {
            let mut keyed = self.inner.keyed.lock();
            if keyed.get(key).is_some_and(|t| t.same_as(&token)) {
                keyed.remove(key);
            }
        }
        queued
    }

    /// Queue every task in `tasks` or none of them.
    ///
    /// Each task supersedes whatever was registered under its key. When the
    /// queue cannot take the whole group nothing is queued and no previous
    /// task is cancelled.
    pub fn start_keyed_group<const N: usize>(
        &self,
        tasks: [KeyedTask; N],
    ) -> Result<[TaskHandle; N], BackpressureError> {
        let mut keyed = self.inner.keyed.lock();
        let mut queue = self.inner.queue.lock();
        if self.inner.shutdown.load(AtomicOrdering::Acquire) {
            return Err(BackpressureError::ShutDown);
        }
        let depth = self.inner.queue_depth.load(AtomicOrdering::Acquire);
        if depth + N > self.inner.max_queue_depth {
            return Err(BackpressureError::QueueFull { depth });
        }

        let handles = tasks.map(|task| {
            let token = CancellationToken::new();
            if let Some(previous) = keyed.insert(task.key.clone(), token.clone()) {
                previous.cancel();
                debug!(target: "framestore::bg", key = %task.key, "Superseded keyed task");
            }
            let (envelope, handle) =
                self.envelope(&task.name, Some(task.key), task.priority, token, task.work);
            queue.push(envelope);
            self.inner.queue_depth.fetch_add(1, AtomicOrdering::Release);
            handle
        });
        drop(queue);
        drop(keyed);

        self.inner.work_ready.notify_all();
        Ok(handles)
    }

    /// Cancel the task registered under `key`, if any.
    pub fn cancel_key(&self, key: &str) -> bool {
        match self.inner.keyed.lock().remove(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn enqueue(
        &self,
        name: &str,
        key: Option<String>,
        priority: TaskPriority,
        token: CancellationToken,
        work: Work,
    ) -> Result<TaskHandle, BackpressureError> {
        // Reject after shutdown: workers have been joined, task would never run
        if self.inner.shutdown.load(AtomicOrdering::Acquire) {
            return Err(BackpressureError::ShutDown);
        }
        let depth = self.inner.queue_depth.load(AtomicOrdering::Acquire);
        if depth >= self.inner.max_queue_depth {
            return Err(BackpressureError::QueueFull { depth });
        }

        let (envelope, handle) = self.envelope(name, key, priority, token, work);
        {
            let mut queue = self.inner.queue.lock();
            queue.push(envelope);
            self.inner.queue_depth.fetch_add(1, AtomicOrdering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(handle)
    }

    fn envelope(
        &self,
        name: &str,
        key: Option<String>,
        priority: TaskPriority,
        token: CancellationToken,
        work: Work,
    ) -> (TaskEnvelope, TaskHandle) {
        let sequence = self.inner.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let name: Arc<str> = Arc::from(name);
        let completion = Arc::new(Completion::default());
        let handle = TaskHandle {
            id: sequence,
            name: Arc::clone(&name),
            token: token.clone(),
            completion: Arc::clone(&completion),
        };
        let envelope = TaskEnvelope {
            priority,
            sequence,
            name,
            key,
            token,
            completion,
            work,
        };
        (envelope, handle)
    }

    /// Block until all queued and in-flight tasks have ended.
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(AtomicOrdering::Acquire) > 0
            || self.inner.active_tasks.load(AtomicOrdering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit and join them. Queued tasks still run first.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);

        // Lock before notifying so a worker between its shutdown check and
        // its wait cannot miss the wakeup.
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(AtomicOrdering::Acquire)
    }

    /// Return a snapshot of scheduler metrics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_depth: self.inner.queue_depth.load(AtomicOrdering::Relaxed),
            active_tasks: self.inner.active_tasks.load(AtomicOrdering::Relaxed),
            tasks_completed: self.inner.tasks_completed.load(AtomicOrdering::Relaxed),
            tasks_cancelled: self.inner.tasks_cancelled.load(AtomicOrdering::Relaxed),
            tasks_panicked: self.inner.tasks_panicked.load(AtomicOrdering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_tasks` and wakes drain waiters on drop, so a panicking
/// task cannot leave `drain()` waiting forever.
struct ActiveTaskGuard<'a> {
    inner: &'a SchedulerInner,
}

impl<'a> Drop for ActiveTaskGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_tasks.fetch_sub(1, AtomicOrdering::Release);
        if prev_active == 1 && self.inner.queue_depth.load(AtomicOrdering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn run_task(inner: &SchedulerInner, task: TaskEnvelope) {
    let TaskEnvelope {
        name,
        key,
        token,
        completion,
        work,
        ..
    } = task;

    let outcome = if token.is_cancelled() {
        TaskOutcome::Cancelled
    } else {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(&token))) {
            Ok(()) if token.is_cancelled() => TaskOutcome::Cancelled,
            Ok(()) => TaskOutcome::Completed,
            Err(e) => {
                let message = e
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| e.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "(non-string panic)".to_string());
                error!(target: "framestore::bg", task = %name, panic = %message, "Background task panicked");
                TaskOutcome::Panicked
            }
        }
    };

    let counter = match outcome {
        TaskOutcome::Completed => &inner.tasks_completed,
        TaskOutcome::Cancelled => &inner.tasks_cancelled,
        TaskOutcome::Panicked => &inner.tasks_panicked,
    };
    counter.fetch_add(1, AtomicOrdering::Relaxed);

    if let Some(key) = key {
        let mut keyed = inner.keyed.lock();
        if keyed.get(&key).is_some_and(|t| t.same_as(&token)) {
            keyed.remove(&key);
        }
    }
    completion.finish(outcome);
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop() {
                    inner.queue_depth.fetch_sub(1, AtomicOrdering::Release);
                    inner.active_tasks.fetch_add(1, AtomicOrdering::Release);
                    break task;
                }
                if inner.shutdown.load(AtomicOrdering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveTaskGuard { inner };
        run_task(inner, task);
    }
}
