//! Cell reselection procedure
//!
//! Periodic wrapper around cell selection while the UE is idle and attached:
//! runs a selection, reacts to its outcome (restarting paging reception on a
//! cell change) and rearms itself through the reselection timer.

use tracing::{error, info, warn};

use crate::proc::{self, ProcFuture, ProcOutcome, ProcResult, Procedure};
use crate::rrc::{cell_selector_slot, Rrc};
use crate::timers::{TimerId, TimerService};

use super::cell_selection::CsResult;

/// Cell reselection procedure state.
pub struct CellReselectionProc {
    reselection_timer: TimerId,
    cell_selection_fut: ProcFuture<CsResult>,
}

impl CellReselectionProc {
    /// Allocates the periodic reselection timer at engine construction.
    pub fn new(timers: &mut TimerService<Rrc>) -> Self {
        Self {
            reselection_timer: timers.get_unique_timer(),
            cell_selection_fut: ProcFuture::detached(),
        }
    }

    /// True when `id` is the self-rearming reselection timer.
    pub(crate) fn owns_timer(&self, id: TimerId) -> bool {
        id == self.reselection_timer
    }
}

impl Procedure for CellReselectionProc {
    type Context = Rrc;
    type Args = ();
    type Event = ();
    type Output = ();

    const NAME: &'static str = "Cell Reselection";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> ProcOutcome {
        self.cell_selection_fut = ProcFuture::detached();

        if rrc.meas_cells.nof_neighbours() == 0
            && rrc.phy_ctrl.is_in_sync()
            && rrc.phy_ctrl.cell_is_camping()
        {
            // no neighbours and already camping, nothing to reselect
            return ProcOutcome::Success;
        }

        info!("starting cell reselection");
        match proc::launch(rrc, cell_selector_slot, ()) {
            Ok(future) => {
                self.cell_selection_fut = future;
                ProcOutcome::Yield
            }
            Err(_) => {
                error!("failed to initiate cell selection");
                ProcOutcome::Error
            }
        }
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, cell_selector_slot) {
            return ProcOutcome::Yield;
        }
        if self.cell_selection_fut.is_error() {
            error!("error while selecting a cell");
            return ProcOutcome::Error;
        }
        let Some(cs_result) = self.cell_selection_fut.value() else {
            error!("cell selection completed without a result");
            return ProcOutcome::Error;
        };

        info!(result = %cs_result, "cell selection completed, handling result");
        match cs_result {
            CsResult::ChangedCell => {
                if rrc.state().is_idle() {
                    info!("new cell selected, starting PCCH reception");
                    rrc.mac.pcch_start_rx();
                }
            }
            CsResult::NoCell => warn!("could not find any cell to camp on"),
            CsResult::SameCell => {
                if !rrc.phy_ctrl.cell_is_camping() {
                    warn!("did not reselect but serving cell is out-of-sync");
                }
            }
        }
        ProcOutcome::Success
    }

    fn output(&self) -> Self::Output {}

    fn then(&mut self, rrc: &mut Rrc, _result: &ProcResult<()>) {
        // rearm while idle and attached
        if rrc.state().is_idle() && rrc.nas.is_attached() {
            let period_ms = rrc.cfg.cell_reselection_period_ms;
            rrc.timers.set(self.reselection_timer, period_ms);
            rrc.timers.run(self.reselection_timer);
        }
    }
}
