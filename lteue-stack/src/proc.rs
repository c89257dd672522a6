//! Cooperative procedure runtime
//!
//! Long-running protocol sequences are expressed as explicit tagged state
//! machines conforming to [`Procedure`]: `init` starts a run, `step` makes
//! one unit of progress per scheduler turn, `react` consumes an asynchronous
//! event, and `then` observes the final result exactly once before the handle
//! returns to idle.
//!
//! Each procedure lives inside a [`ProcHandle`] that enforces at-most-one
//! active instance. While a procedure executes, its value is taken out of the
//! slot so the whole engine context can be borrowed mutably without aliasing;
//! nested procedures therefore always occupy distinct slots. Completion is
//! observable through a [`ProcFuture`], a one-shot latch stamped with the
//! launch generation; relaunching a handle invalidates every future handed
//! out for the previous run.

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Result of one procedure call: keep going, or finish with a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcOutcome {
    /// The procedure stays in flight and will be stepped again.
    Yield,
    /// The procedure finished successfully.
    Success,
    /// The procedure finished with an error.
    Error,
}

/// Final result of a completed procedure run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcResult<T> {
    /// Completed successfully with the procedure's output.
    Success(T),
    /// Completed with an error.
    Error,
}

impl<T> ProcResult<T> {
    /// True if the run completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, ProcResult::Success(_))
    }

    /// True if the run completed with an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ProcResult::Error)
    }

    /// The output value, if successful.
    pub fn value(&self) -> Option<&T> {
        match self {
            ProcResult::Success(v) => Some(v),
            ProcResult::Error => None,
        }
    }
}

/// A cooperative procedure driven by the runtime.
///
/// Implementations are plain structs holding their per-run state; `init` must
/// reset every field so a relaunch starts fresh.
pub trait Procedure: Sized {
    /// Engine context borrowed for the duration of each call.
    type Context;
    /// Launch arguments.
    type Args;
    /// Event type accepted by `react`.
    type Event;
    /// Output delivered on success.
    type Output: Clone;

    /// Procedure name used in logs.
    const NAME: &'static str;

    /// Starts a run. A `Success`/`Error` return completes synchronously.
    fn init(&mut self, ctx: &mut Self::Context, args: Self::Args) -> ProcOutcome;

    /// Makes one unit of progress. Called once per scheduler turn while the
    /// procedure is in flight.
    fn step(&mut self, ctx: &mut Self::Context) -> ProcOutcome;

    /// Consumes an asynchronous event. The default implementation ignores the
    /// event with a warning.
    fn react(&mut self, ctx: &mut Self::Context, event: Self::Event) -> ProcOutcome {
        let _ = (ctx, event);
        warn!(proc = Self::NAME, "unhandled event ignored");
        ProcOutcome::Yield
    }

    /// Samples the output after a successful run.
    fn output(&self) -> Self::Output;

    /// Observes the final result, exactly once per completed run, before the
    /// handle returns to idle.
    fn then(&mut self, ctx: &mut Self::Context, result: &ProcResult<Self::Output>) {
        let _ = (ctx, result);
    }
}

struct FutureInner<T> {
    generation: u64,
    result: Option<ProcResult<T>>,
}

/// One-shot completion latch bound to a specific launch of a [`ProcHandle`].
pub struct ProcFuture<T> {
    inner: Arc<Mutex<FutureInner<T>>>,
    generation: u64,
}

impl<T> Clone for ProcFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            generation: self.generation,
        }
    }
}

impl<T> ProcFuture<T> {
    /// A future bound to no launch; it never completes. Useful as the initial
    /// value of a future-typed field.
    pub fn detached() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FutureInner {
                generation: 0,
                result: None,
            })),
            generation: 0,
        }
    }

    /// True while this future still refers to the handle's current launch.
    pub fn is_valid(&self) -> bool {
        self.inner.lock().expect("future lock").generation == self.generation
    }

    /// True once the launch this future refers to has completed.
    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock().expect("future lock");
        inner.generation == self.generation && inner.result.is_some()
    }

    /// True once completed successfully.
    pub fn is_success(&self) -> bool {
        let inner = self.inner.lock().expect("future lock");
        inner.generation == self.generation
            && inner.result.as_ref().is_some_and(ProcResult::is_success)
    }

    /// True once completed with an error.
    pub fn is_error(&self) -> bool {
        let inner = self.inner.lock().expect("future lock");
        inner.generation == self.generation
            && inner.result.as_ref().is_some_and(ProcResult::is_error)
    }
}

impl<T: Clone> ProcFuture<T> {
    /// The output value, once completed successfully.
    pub fn value(&self) -> Option<T> {
        let inner = self.inner.lock().expect("future lock");
        if inner.generation != self.generation {
            return None;
        }
        inner
            .result
            .as_ref()
            .and_then(|r| r.value().cloned())
    }
}

impl<T> Default for ProcFuture<T> {
    fn default() -> Self {
        Self::detached()
    }
}

/// Error returned by [`launch`] when the handle already has a run in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcBusy;

/// Slot holding at most one active instance of procedure `P`.
pub struct ProcHandle<P: Procedure> {
    proc_: Option<P>,
    running: bool,
    generation: u64,
    inner: Arc<Mutex<FutureInner<P::Output>>>,
}

impl<P: Procedure> ProcHandle<P> {
    /// Wraps a procedure value in an idle handle.
    pub fn new(proc_: P) -> Self {
        Self {
            proc_: Some(proc_),
            running: false,
            generation: 0,
            inner: Arc::new(Mutex::new(FutureInner {
                generation: 0,
                result: None,
            })),
        }
    }

    /// True when no run is in flight.
    pub fn is_idle(&self) -> bool {
        !self.running
    }

    /// True while a run is in flight.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Launch generation, incremented on every launch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A future observing the current launch (or the next one, if idle and
    /// never launched).
    pub fn get_future(&self) -> ProcFuture<P::Output> {
        ProcFuture {
            inner: Arc::clone(&self.inner),
            generation: self.generation,
        }
    }

    /// Read access to the procedure value. `None` while the value is taken
    /// out for a call higher up the stack.
    pub fn get(&self) -> Option<&P> {
        self.proc_.as_ref()
    }

    fn take_for_launch(&mut self) -> Option<P> {
        if self.running {
            return None;
        }
        let proc_ = self.proc_.take()?;
        self.generation += 1;
        let mut inner = self.inner.lock().expect("future lock");
        inner.generation = self.generation;
        inner.result = None;
        drop(inner);
        self.running = true;
        Some(proc_)
    }

    fn take_running(&mut self) -> Option<P> {
        if self.running {
            self.proc_.take()
        } else {
            None
        }
    }

    fn put_back(&mut self, proc_: P) {
        self.proc_ = Some(proc_);
    }

    fn mark_idle(&mut self) {
        self.running = false;
    }

    fn complete_future(&mut self, result: &ProcResult<P::Output>) {
        let mut inner = self.inner.lock().expect("future lock");
        inner.result = Some(result.clone());
    }
}

/// Launches a procedure on the handle selected by `slot`.
///
/// Fails with [`ProcBusy`] if a run is already in flight. On success returns
/// a future bound to this launch; if `init` completed synchronously the
/// future is already resolved.
pub fn launch<P, F>(
    ctx: &mut P::Context,
    slot: F,
    args: P::Args,
) -> Result<ProcFuture<P::Output>, ProcBusy>
where
    P: Procedure,
    F: for<'a> Fn(&'a mut P::Context) -> &'a mut ProcHandle<P>,
{
    let Some(mut proc_) = slot(ctx).take_for_launch() else {
        warn!(proc = P::NAME, "launch rejected: procedure busy");
        return Err(ProcBusy);
    };
    debug!(proc = P::NAME, "launched");
    let outcome = proc_.init(ctx, args);
    let future = slot(ctx).get_future();
    settle(ctx, &slot, proc_, outcome);
    Ok(future)
}

/// Steps the handle's in-flight run, if any. Returns true iff the procedure
/// is still running after the call.
pub fn run<P, F>(ctx: &mut P::Context, slot: F) -> bool
where
    P: Procedure,
    F: for<'a> Fn(&'a mut P::Context) -> &'a mut ProcHandle<P>,
{
    if !slot(ctx).is_running() {
        return false;
    }
    let Some(mut proc_) = slot(ctx).take_running() else {
        // already being driven higher in the call stack
        return true;
    };
    let outcome = proc_.step(ctx);
    settle(ctx, &slot, proc_, outcome)
}

/// Delivers an event to the handle's in-flight run. Events for idle handles
/// are dropped with a warning. Returns true iff the event was delivered.
pub fn trigger<P, F>(ctx: &mut P::Context, slot: F, event: P::Event) -> bool
where
    P: Procedure,
    F: for<'a> Fn(&'a mut P::Context) -> &'a mut ProcHandle<P>,
{
    if !slot(ctx).is_running() {
        warn!(proc = P::NAME, "event ignored: procedure not running");
        return false;
    }
    let Some(mut proc_) = slot(ctx).take_running() else {
        warn!(proc = P::NAME, "event dropped: procedure busy in a nested call");
        return false;
    };
    let outcome = proc_.react(ctx, event);
    settle(ctx, &slot, proc_, outcome);
    true
}

fn settle<P, F>(ctx: &mut P::Context, slot: &F, proc_: P, outcome: ProcOutcome) -> bool
where
    P: Procedure,
    F: for<'a> Fn(&'a mut P::Context) -> &'a mut ProcHandle<P>,
{
    match outcome {
        ProcOutcome::Yield => {
            slot(ctx).put_back(proc_);
            true
        }
        ProcOutcome::Success => {
            let result = ProcResult::Success(proc_.output());
            finish(ctx, slot, proc_, result);
            false
        }
        ProcOutcome::Error => {
            finish(ctx, slot, proc_, ProcResult::Error);
            false
        }
    }
}

fn finish<P, F>(ctx: &mut P::Context, slot: &F, mut proc_: P, result: ProcResult<P::Output>)
where
    P: Procedure,
    F: for<'a> Fn(&'a mut P::Context) -> &'a mut ProcHandle<P>,
{
    // complete the future first so `then` observers see a resolved latch
    slot(ctx).complete_future(&result);
    proc_.then(ctx, &result);
    let handle = slot(ctx);
    handle.put_back(proc_);
    handle.mark_idle();
    debug!(
        proc = P::NAME,
        success = result.is_success(),
        "procedure completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        counter: ProcHandle<CountdownProc>,
        log: Vec<String>,
    }

    impl Ctx {
        fn new() -> Self {
            Self {
                counter: ProcHandle::new(CountdownProc::default()),
                log: Vec::new(),
            }
        }
    }

    #[derive(Default)]
    struct CountdownProc {
        remaining: u32,
        steps_taken: u32,
    }

    impl Procedure for CountdownProc {
        type Context = Ctx;
        type Args = u32;
        type Event = u32;
        type Output = u32;
        const NAME: &'static str = "Countdown";

        fn init(&mut self, ctx: &mut Ctx, args: u32) -> ProcOutcome {
            self.remaining = args;
            self.steps_taken = 0;
            ctx.log.push("init".into());
            if self.remaining == 0 {
                ProcOutcome::Success
            } else {
                ProcOutcome::Yield
            }
        }

        fn step(&mut self, ctx: &mut Ctx) -> ProcOutcome {
            self.remaining -= 1;
            self.steps_taken += 1;
            ctx.log.push(format!("step:{}", self.remaining));
            if self.remaining == 0 {
                ProcOutcome::Success
            } else {
                ProcOutcome::Yield
            }
        }

        fn react(&mut self, ctx: &mut Ctx, event: u32) -> ProcOutcome {
            self.remaining = self.remaining.saturating_sub(event);
            ctx.log.push(format!("react:{}", self.remaining));
            if self.remaining == 0 {
                ProcOutcome::Success
            } else {
                ProcOutcome::Yield
            }
        }

        fn output(&self) -> u32 {
            self.steps_taken
        }

        fn then(&mut self, ctx: &mut Ctx, result: &ProcResult<u32>) {
            ctx.log.push(format!("then:{}", result.is_success()));
        }
    }

    fn slot(ctx: &mut Ctx) -> &mut ProcHandle<CountdownProc> {
        &mut ctx.counter
    }

    #[test]
    fn test_launch_and_run_to_completion() {
        let mut ctx = Ctx::new();
        let future = launch(&mut ctx, slot, 2).unwrap();
        assert!(ctx.counter.is_running());
        assert!(!future.is_complete());

        assert!(run(&mut ctx, slot));
        assert!(!run(&mut ctx, slot)); // completes on the second step
        assert!(ctx.counter.is_idle());
        assert!(future.is_success());
        assert_eq!(future.value(), Some(2));
    }

    #[test]
    fn test_synchronous_completion_at_init() {
        let mut ctx = Ctx::new();
        let future = launch(&mut ctx, slot, 0).unwrap();
        assert!(ctx.counter.is_idle());
        assert!(future.is_complete());
        assert_eq!(future.value(), Some(0));
        // then fired before the handle went idle
        assert_eq!(ctx.log, vec!["init", "then:true"]);
    }

    #[test]
    fn test_launch_while_running_is_busy() {
        let mut ctx = Ctx::new();
        launch(&mut ctx, slot, 3).unwrap();
        assert!(launch(&mut ctx, slot, 1).is_err());
        assert!(ctx.counter.is_running());
    }

    #[test]
    fn test_relaunch_after_completion_starts_fresh() {
        let mut ctx = Ctx::new();
        let first = launch(&mut ctx, slot, 1).unwrap();
        assert!(!run(&mut ctx, slot));
        assert!(first.is_complete());

        let second = launch(&mut ctx, slot, 1).unwrap();
        assert!(!second.is_complete());
        assert!(!run(&mut ctx, slot));
        assert_eq!(second.value(), Some(1));
    }

    #[test]
    fn test_relaunch_invalidates_previous_future() {
        let mut ctx = Ctx::new();
        let first = launch(&mut ctx, slot, 1).unwrap();
        assert!(!run(&mut ctx, slot));
        assert!(first.is_complete());

        launch(&mut ctx, slot, 5).unwrap();
        assert!(!first.is_valid());
        assert!(!first.is_complete());
        assert_eq!(first.value(), None);
    }

    #[test]
    fn test_trigger_reaches_running_procedure() {
        let mut ctx = Ctx::new();
        let future = launch(&mut ctx, slot, 5).unwrap();
        assert!(trigger(&mut ctx, slot, 5));
        assert!(ctx.counter.is_idle());
        assert!(future.is_success());
    }

    #[test]
    fn test_trigger_on_idle_handle_is_dropped() {
        let mut ctx = Ctx::new();
        assert!(!trigger(&mut ctx, slot, 1));
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn test_run_on_idle_handle_returns_false() {
        let mut ctx = Ctx::new();
        assert!(!run(&mut ctx, slot));
    }

    #[test]
    fn test_then_runs_before_handle_goes_idle() {
        let mut ctx = Ctx::new();
        launch(&mut ctx, slot, 1).unwrap();
        run(&mut ctx, slot);
        assert_eq!(ctx.log.last().unwrap(), "then:true");
    }

    #[test]
    fn test_detached_future_never_completes() {
        let future: ProcFuture<u32> = ProcFuture::default();
        assert!(!future.is_complete());
        assert_eq!(future.value(), None);
    }
}
