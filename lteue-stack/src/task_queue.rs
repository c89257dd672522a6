//! Stack task queue and background worker pool
//!
//! The stack thread consumes a bounded multi-producer/single-consumer queue
//! partitioned into per-producer sub-queues (UE control, PHY sync, GW, MAC,
//! background results) that are drained in round-robin so no producer can
//! starve the others. `try_push` fails when a sub-queue is full; callers
//! translate that into warn-and-drop.
//!
//! A small fixed pool of background workers exists for CPU-heavy offloads;
//! completions are posted back onto the stack thread through the queue.

use crossbeam_channel::{bounded, Receiver, Select, Sender, TryRecvError, TrySendError};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Producer handle for one sub-queue of a [`TaskMultiQueue`].
pub struct TaskProducer<T> {
    name: &'static str,
    tx: Sender<T>,
}

impl<T> Clone for TaskProducer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskProducer<T> {
    /// Non-blocking push. Returns false (and warns) when the sub-queue is
    /// full or the consumer is gone; the task is dropped.
    pub fn try_push(&self, task: T) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(queue = self.name, "task queue full, dropping task");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(queue = self.name, "task queue disconnected");
                false
            }
        }
    }

    /// Blocking push. Returns false if the consumer is gone.
    pub fn push(&self, task: T) -> bool {
        self.tx.send(task).is_ok()
    }

    /// Name of the sub-queue this producer feeds.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Multi-producer/single-consumer task queue with per-producer sub-queues.
pub struct TaskMultiQueue<T> {
    receivers: Vec<(&'static str, Receiver<T>)>,
    next: usize,
}

impl<T> TaskMultiQueue<T> {
    /// Creates an empty multi-queue.
    pub fn new() -> Self {
        Self {
            receivers: Vec::new(),
            next: 0,
        }
    }

    /// Adds a named bounded sub-queue and returns its producer handle.
    pub fn add_queue(&mut self, name: &'static str, capacity: usize) -> TaskProducer<T> {
        let (tx, rx) = bounded(capacity);
        self.receivers.push((name, rx));
        TaskProducer { name, tx }
    }

    /// Pops one task, scanning sub-queues round-robin from the cursor.
    pub fn try_pop(&mut self) -> Option<T> {
        let n = self.receivers.len();
        for i in 0..n {
            let idx = (self.next + i) % n;
            match self.receivers[idx].1.try_recv() {
                Ok(task) => {
                    self.next = (idx + 1) % n;
                    return Some(task);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        None
    }

    /// Blocks until a task is available and pops it. Returns `None` only when
    /// every producer has been dropped and all sub-queues are drained.
    pub fn wait_pop(&mut self) -> Option<T> {
        loop {
            let n = self.receivers.len();
            if n == 0 {
                return None;
            }
            let mut all_disconnected = true;
            for i in 0..n {
                let idx = (self.next + i) % n;
                match self.receivers[idx].1.try_recv() {
                    Ok(task) => {
                        self.next = (idx + 1) % n;
                        return Some(task);
                    }
                    Err(TryRecvError::Empty) => all_disconnected = false,
                    Err(TryRecvError::Disconnected) => {}
                }
            }
            if all_disconnected {
                return None;
            }

            let mut select = Select::new();
            for (_, rx) in &self.receivers {
                select.recv(rx);
            }
            // wakes when any sub-queue becomes ready or disconnects
            let _ = select.ready();
        }
    }

    /// Number of sub-queues.
    pub fn nof_queues(&self) -> usize {
        self.receivers.len()
    }
}

impl<T> Default for TaskMultiQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU-heavy offload closure; receives the worker index.
pub type BackgroundTask = Box<dyn FnOnce(u32) + Send>;

/// Fixed pool of background worker threads for CPU-heavy offloads.
pub struct BackgroundWorkerPool {
    tx: Option<Sender<BackgroundTask>>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundWorkerPool {
    /// Spawns `nof_workers` threads sharing one bounded job queue.
    pub fn new(nof_workers: u32, capacity: usize) -> Self {
        let (tx, rx) = bounded::<BackgroundTask>(capacity);
        let workers = (0..nof_workers)
            .map(|worker_id| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("bg-worker-{worker_id}"))
                    .spawn(move || {
                        while let Ok(task) = rx.recv() {
                            task(worker_id);
                        }
                    })
                    .expect("failed to spawn background worker")
            })
            .collect();
        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queues a task on the pool. Returns false (and warns) when full.
    pub fn push_task(&self, task: BackgroundTask) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("background task pool full, dropping task");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Stops the pool, waiting for in-flight tasks to finish.
    pub fn stop(&mut self) {
        self.tx = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for BackgroundWorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
