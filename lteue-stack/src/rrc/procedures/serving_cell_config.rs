//! Serving cell configuration procedure
//!
//! Walks an ordered list of required SIB indices: SIBs already acquired are
//! applied directly, missing ones are fetched through the SI acquisition
//! procedure. A failure is fatal only for SIB1/SIB2; optional SIBs that
//! cannot be acquired (or are not scheduled) are skipped.

use tracing::{debug, error, info, warn};

use crate::proc::{self, ProcFuture, ProcOutcome, Procedure};
use crate::rrc::{si_acquirer_slot, Rrc};

/// Serving cell configuration procedure state.
#[derive(Default)]
pub struct ServingCellConfigProc {
    required_sibs: Vec<u32>,
    req_idx: usize,
    si_acquire_fut: ProcFuture<()>,
}

impl ServingCellConfigProc {
    /// Applies present SIBs and launches acquisition of the next missing one.
    fn launch_sib_acquire(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        while self.req_idx < self.required_sibs.len() {
            let required_sib = self.required_sibs[self.req_idx];
            if !rrc.meas_cells.serving_cell().has_sib(required_sib) {
                if required_sib < 2
                    || rrc.meas_cells.serving_cell().is_sib_scheduled(required_sib)
                {
                    info!(sib = required_sib + 1, "cell is missing SIB, obtaining it");
                    match proc::launch(rrc, si_acquirer_slot, required_sib) {
                        Ok(future) => {
                            self.si_acquire_fut = future;
                            return ProcOutcome::Yield;
                        }
                        Err(_) => {
                            error!("SI acquisition already running");
                            return ProcOutcome::Error;
                        }
                    }
                }
                debug!(
                    sib = required_sib + 1,
                    "SIB not scheduled in SIB1, skipping"
                );
                self.req_idx += 1;
            } else {
                info!(sib = required_sib + 1, "cell has SIB");
                match required_sib {
                    1 => rrc.handle_sib2(),
                    12 => rrc.handle_sib13(),
                    _ => {}
                }
                self.req_idx += 1;
            }
        }

        info!("serving cell configuration finished successfully");
        ProcOutcome::Success
    }
}

impl Procedure for ServingCellConfigProc {
    type Context = Rrc;
    type Args = Vec<u32>;
    type Event = ();
    type Output = ();

    const NAME: &'static str = "Serving Cell Configuration";

    fn init(&mut self, rrc: &mut Rrc, required_sibs: Vec<u32>) -> ProcOutcome {
        self.required_sibs = required_sibs;
        self.req_idx = 0;
        self.si_acquire_fut = ProcFuture::detached();

        info!(sibs = ?self.required_sibs, "starting serving cell configuration");

        if !rrc.phy_ctrl.cell_is_camping() {
            error!("cannot configure the serving cell while not camping on it");
            return ProcOutcome::Error;
        }

        self.launch_sib_acquire(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if !self.si_acquire_fut.is_complete() {
            return ProcOutcome::Yield;
        }
        let required_sib = self.required_sibs[self.req_idx];
        if self.si_acquire_fut.is_error()
            || !rrc.meas_cells.serving_cell().has_sib(required_sib)
        {
            if required_sib < 2 {
                warn!(sib = required_sib + 1, "serving cell configuration failed");
                return ProcOutcome::Error;
            }
            // optional SIB could not be acquired, continue with the rest
        }
        self.req_idx += 1;
        self.launch_sib_acquire(rrc)
    }

    fn output(&self) -> Self::Output {}
}
