//! Millisecond timer service for the stack thread
//!
//! All engine timers (T300/T301/T302/T304/T310/T311, SI acquisition retry and
//! timeout, RLC flush, reselection period) are driven from here. The service
//! is stepped once per TTI (1 ms) by the stack scheduler turn, after the
//! procedures have run, so expiries never interrupt a procedure step.
//!
//! Expiries are reported as timer ids resolved by the engine at fire time;
//! timers never capture references into the engine. One-shot deferred
//! closures (`defer_callback`) are stored against their timer id and taken
//! out when the id fires.

use tracing::warn;

/// Handle to a timer owned by the [`TimerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Deferred one-shot callback executed on the engine context at expiry.
pub type DeferredCallback<C> = Box<dyn FnOnce(&mut C) + Send>;

struct TimerEntry<C> {
    duration_ms: u32,
    elapsed_ms: u32,
    running: bool,
    expired: bool,
    deferred: Option<DeferredCallback<C>>,
}

impl<C> TimerEntry<C> {
    fn new() -> Self {
        Self {
            duration_ms: 0,
            elapsed_ms: 0,
            running: false,
            expired: false,
            deferred: None,
        }
    }
}

/// Monotonic millisecond timer service.
///
/// `C` is the context type passed to deferred callbacks when they fire.
pub struct TimerService<C> {
    entries: Vec<TimerEntry<C>>,
}

impl<C> TimerService<C> {
    /// Creates an empty timer service.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Allocates a reusable timer. The timer starts stopped with duration 0;
    /// arm it with [`set`](Self::set) and [`run`](Self::run).
    pub fn get_unique_timer(&mut self) -> TimerId {
        let id = TimerId(self.entries.len() as u32);
        self.entries.push(TimerEntry::new());
        id
    }

    /// Rearms the timer with a new duration. The timer is left stopped.
    pub fn set(&mut self, id: TimerId, duration_ms: u32) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.duration_ms = duration_ms;
            entry.elapsed_ms = 0;
            entry.running = false;
            entry.expired = false;
        } else {
            warn!(%id, "set on unknown timer");
        }
    }

    /// Starts (or restarts) the timer from zero.
    pub fn run(&mut self, id: TimerId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.elapsed_ms = 0;
            entry.expired = false;
            entry.running = true;
        } else {
            warn!(%id, "run on unknown timer");
        }
    }

    /// Stops the timer. Idempotent; a stopped timer will not fire for the
    /// current arming.
    pub fn stop(&mut self, id: TimerId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.running = false;
        }
    }

    /// Returns true while the timer is armed and counting.
    pub fn is_running(&self, id: TimerId) -> bool {
        self.entries
            .get(id.0 as usize)
            .is_some_and(|e| e.running)
    }

    /// Returns true if the last arming ran to expiry.
    pub fn is_expired(&self, id: TimerId) -> bool {
        self.entries
            .get(id.0 as usize)
            .is_some_and(|e| e.expired)
    }

    /// Milliseconds elapsed in the current arming.
    pub fn time_elapsed(&self, id: TimerId) -> u32 {
        self.entries
            .get(id.0 as usize)
            .map_or(0, |e| e.elapsed_ms)
    }

    /// Configured duration of the timer.
    pub fn duration(&self, id: TimerId) -> u32 {
        self.entries
            .get(id.0 as usize)
            .map_or(0, |e| e.duration_ms)
    }

    /// Schedules a one-shot closure to run on the engine context after
    /// `duration_ms` milliseconds.
    pub fn defer_callback<F>(&mut self, duration_ms: u32, callback: F) -> TimerId
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let id = self.get_unique_timer();
        let entry = &mut self.entries[id.0 as usize];
        entry.duration_ms = duration_ms;
        entry.deferred = Some(Box::new(callback));
        entry.running = true;
        id
    }

    /// Takes the deferred closure armed on `id`, if any.
    pub fn take_deferred(&mut self, id: TimerId) -> Option<DeferredCallback<C>> {
        self.entries
            .get_mut(id.0 as usize)
            .and_then(|e| e.deferred.take())
    }

    /// Advances all running timers by one millisecond and returns the ids
    /// that expired on this step, in registration order.
    pub fn step_all(&mut self) -> Vec<TimerId> {
        let mut fired = Vec::new();
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if !entry.running {
                continue;
            }
            entry.elapsed_ms += 1;
            if entry.elapsed_ms >= entry.duration_ms {
                entry.elapsed_ms = entry.duration_ms;
                entry.running = false;
                entry.expired = true;
                fired.push(TimerId(idx as u32));
            }
        }
        fired
    }

    /// Number of allocated timers.
    pub fn nof_timers(&self) -> usize {
        self.entries.len()
    }
}

impl<C> Default for TimerService<C> {
    fn default() -> Self {
        Self::new()
    }
}
