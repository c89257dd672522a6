//! SI acquisition procedure
//!
//! Acquisition of an SI message per TS 36.331 Section 5.2.3. Computes the
//! next SI window for the requested SIB, instructs the MAC BCCH receiver,
//! and retries every `si-Periodicity * 5` radio frames (every SIB1 period
//! for SIB1 itself) until the SIB arrives or the overall acquisition
//! timeout fires.

use tracing::{error, info, warn};

use crate::proc::{ProcOutcome, ProcResult, Procedure};
use crate::rrc::Rrc;
use crate::si;
use crate::timers::{TimerId, TimerService};

/// Retry budget expressed in SI periods, covering MAC HARQ retransmissions.
const NOF_SIB_HARQ_RETX: u32 = 5;

/// Events consumed by the SI acquisition procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiAcquireEvent {
    /// A system information block was received for the serving cell.
    SibReceived,
    /// One of the procedure's timers expired.
    TimerExpired(TimerId),
}

/// SI acquisition procedure state.
pub struct SiAcquireProc {
    sib_index: u32,
    period: u32,
    sched_index: usize,
    retry_timer: TimerId,
    timeout_timer: TimerId,
}

impl SiAcquireProc {
    /// Allocates the retry and timeout timers at engine construction.
    pub fn new(timers: &mut TimerService<Rrc>) -> Self {
        Self {
            sib_index: 0,
            period: 0,
            sched_index: 0,
            retry_timer: timers.get_unique_timer(),
            timeout_timer: timers.get_unique_timer(),
        }
    }

    /// True when `id` is one of this procedure's timers.
    pub(crate) fn owns_timer(&self, id: TimerId) -> bool {
        id == self.retry_timer || id == self.timeout_timer
    }

    /// Programs the MAC for the next SI window and arms the retry timer.
    fn start_si_acquire(&mut self, rrc: &mut Rrc) {
        let tti = rrc.current_tti;
        let (si_win_start, si_win_len) = si::si_window(
            tti,
            self.sib_index,
            self.sched_index,
            self.period,
            rrc.meas_cells.serving_cell().sib1(),
        );
        if si_win_start < tti {
            error!(
                si_win_start,
                tti, "SI window start miscalculated, skipping attempt"
            );
            return;
        }
        rrc.mac.bcch_start_rx(si_win_start, si_win_len);

        let retry_period = if self.sib_index == 0 {
            si::SIB1_PERIODICITY
        } else {
            self.period * NOF_SIB_HARQ_RETX
        };
        let ticks_until_retry = retry_period + (si_win_start - tti);
        rrc.timers.set(self.retry_timer, ticks_until_retry);
        rrc.timers.run(self.retry_timer);

        info!(
            sib = self.sib_index + 1,
            si_win_start,
            si_win_len,
            period = self.period,
            sched_index = self.sched_index,
            "instructed MAC to receive system information"
        );
    }
}

impl Procedure for SiAcquireProc {
    type Context = Rrc;
    type Args = u32;
    type Event = SiAcquireEvent;
    type Output = ();

    const NAME: &'static str = "SI Acquire";

    fn init(&mut self, rrc: &mut Rrc, sib_index: u32) -> ProcOutcome {
        self.sib_index = sib_index;

        if rrc.meas_cells.serving_cell().has_sib(sib_index) {
            info!(sib = sib_index + 1, "SIB already acquired");
            return ProcOutcome::Success;
        }
        if sib_index > 0 && !rrc.meas_cells.serving_cell().has_sib1() {
            error!(
                sib = sib_index + 1,
                "cannot acquire SIB before SIB1 is received"
            );
            return ProcOutcome::Error;
        }

        let Some((period, sched_index)) =
            si::si_periodicity_and_index(sib_index, rrc.meas_cells.serving_cell().sib1())
        else {
            info!(sib = sib_index + 1, "SIB not scheduled in SIB1");
            return ProcOutcome::Error;
        };
        self.period = period;
        self.sched_index = sched_index;

        info!(sib = sib_index + 1, "starting SI acquisition");
        self.start_si_acquire(rrc);

        let timeout_ms = rrc.cfg.sib_search_timeout_ms;
        rrc.timers.set(self.timeout_timer, timeout_ms);
        rrc.timers.run(self.timeout_timer);

        ProcOutcome::Yield
    }

    fn step(&mut self, _rrc: &mut Rrc) -> ProcOutcome {
        // progress is event driven: SIB arrival or timer expiry
        ProcOutcome::Yield
    }

    fn react(&mut self, rrc: &mut Rrc, event: SiAcquireEvent) -> ProcOutcome {
        if rrc.meas_cells.serving_cell().has_sib(self.sib_index) {
            return ProcOutcome::Success;
        }
        match event {
            SiAcquireEvent::SibReceived => ProcOutcome::Yield,
            SiAcquireEvent::TimerExpired(id) if id == self.retry_timer => {
                info!(sib = self.sib_index + 1, "SI acquisition retry");
                self.start_si_acquire(rrc);
                ProcOutcome::Yield
            }
            SiAcquireEvent::TimerExpired(id) if id == self.timeout_timer => {
                error!(sib = self.sib_index + 1, "timeout while acquiring SIB");
                ProcOutcome::Error
            }
            SiAcquireEvent::TimerExpired(id) => {
                warn!(%id, "unrecognized timer id");
                ProcOutcome::Error
            }
        }
    }

    fn output(&self) -> Self::Output {}

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        rrc.timers.stop(self.retry_timer);
        rrc.timers.stop(self.timeout_timer);
        if result.is_success() {
            info!(sib = self.sib_index + 1, "SIB acquired successfully");
        } else {
            error!(sib = self.sib_index + 1, "failed to acquire SIB");
        }
    }
}
