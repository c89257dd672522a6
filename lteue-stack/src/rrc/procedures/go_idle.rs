//! Go-idle procedure
//!
//! Releases the RRC connection locally once the RLC signalling bearers have
//! flushed their transmit queues, or unconditionally when the flush timer
//! fires. When the UE is attached, completion schedules a cell reselection
//! so the UE returns to camped-and-monitoring-paging.

use tracing::{debug, error, info};

use crate::proc::{self, ProcOutcome, ProcResult, Procedure};
use crate::rrc::{cell_reselector_slot, ProcId, Rrc};
use crate::timers::{TimerId, TimerService};

/// Go-idle procedure state.
pub struct GoIdleProc {
    rlc_flush_timer: TimerId,
}

impl GoIdleProc {
    /// Allocates the RLC flush timer at engine construction.
    pub fn new(timers: &mut TimerService<Rrc>) -> Self {
        Self {
            rlc_flush_timer: timers.get_unique_timer(),
        }
    }

    /// True when `id` is this procedure's flush timer.
    pub(crate) fn owns_timer(&self, id: TimerId) -> bool {
        id == self.rlc_flush_timer
    }
}

impl Procedure for GoIdleProc {
    type Context = Rrc;
    type Args = ();
    type Event = bool;
    type Output = ();

    const NAME: &'static str = "Go Idle";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> ProcOutcome {
        info!("starting transition to idle");
        let timeout_ms = rrc.cfg.rlc_flush_timeout_ms;
        rrc.timers.set(self.rlc_flush_timer, timeout_ms);
        rrc.timers.run(self.rlc_flush_timer);
        // defer the first flush check by one turn
        ProcOutcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if rrc.state().is_idle() {
            info!("RRC already became IDLE");
            return ProcOutcome::Success;
        }

        if rrc.srbs_flushed() {
            rrc.leave_connected();
            info!("left connected state");
            return ProcOutcome::Success;
        }

        debug!(
            elapsed_ms = rrc.timers.time_elapsed(self.rlc_flush_timer),
            timeout_ms = rrc.timers.duration(self.rlc_flush_timer),
            "postponing transition to idle"
        );
        ProcOutcome::Yield
    }

    fn react(&mut self, rrc: &mut Rrc, _flush_timeout: bool) -> ProcOutcome {
        rrc.leave_connected();
        info!("left connected state on flush timeout");
        ProcOutcome::Success
    }

    fn output(&self) -> Self::Output {}

    fn then(&mut self, rrc: &mut Rrc, _result: &ProcResult<()>) {
        rrc.timers.stop(self.rlc_flush_timer);
        if rrc.nas.is_attached() {
            match proc::launch(rrc, cell_reselector_slot, ()) {
                Ok(_) => rrc.add_to_callback_list(ProcId::CellReselection),
                Err(_) => error!("failed to initiate a cell reselection"),
            }
        }
    }
}
