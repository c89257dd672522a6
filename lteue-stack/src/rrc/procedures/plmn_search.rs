//! PLMN search procedure
//!
//! Walks every known frequency with the cell search procedure, collecting
//! the PLMN/TAC pairs announced in each found cell's SIB1. The result list
//! is delivered to NAS on completion; a failed search is reported with a
//! PLMN count of -1.

use tracing::{error, info};

use crate::interfaces::{CellSearchOutcome, CellSearchResult, LastFreq};
use crate::proc::{self, ProcFuture, ProcOutcome, ProcResult, Procedure};
use crate::rrc::{cell_searcher_slot, Rrc};
use lteue_common::types::FoundPlmn;

/// Upper bound of PLMNs reported to NAS.
pub const MAX_FOUND_PLMNS: usize = 16;

/// PLMN search procedure state.
#[derive(Default)]
pub struct PlmnSearchProc {
    found: Vec<FoundPlmn>,
    cell_search_fut: ProcFuture<CellSearchResult>,
}

impl PlmnSearchProc {
    fn launch_search(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match proc::launch(rrc, cell_searcher_slot, ()) {
            Ok(future) => {
                self.cell_search_fut = future;
                ProcOutcome::Yield
            }
            Err(_) => {
                error!("failed to initiate cell search");
                ProcOutcome::Error
            }
        }
    }

    fn collect_serving_plmns(&mut self, rrc: &Rrc) {
        let serving = rrc.meas_cells.serving_cell();
        if !serving.has_sib1() {
            error!("found cell has no SIB1, skipping PLMN extraction");
            return;
        }
        for i in 0..serving.nof_plmns() {
            let Some(plmn) = serving.plmn(i) else { continue };
            if self.found.len() >= MAX_FOUND_PLMNS {
                error!(max = MAX_FOUND_PLMNS, "no more space for PLMNs");
                break;
            }
            self.found.push(FoundPlmn {
                plmn,
                tac: serving.tac(),
            });
        }
    }
}

impl Procedure for PlmnSearchProc {
    type Context = Rrc;
    type Args = ();
    type Event = ();
    type Output = Vec<FoundPlmn>;

    const NAME: &'static str = "PLMN Search";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> ProcOutcome {
        info!("starting PLMN search");
        self.found.clear();
        self.launch_search(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, cell_searcher_slot) {
            // wait for the next TTI
            return ProcOutcome::Yield;
        }
        if self.cell_search_fut.is_error() {
            error!("cell search sub-procedure failed");
            return ProcOutcome::Error;
        }
        let Some(result) = self.cell_search_fut.value() else {
            error!("cell search completed without a result");
            return ProcOutcome::Error;
        };
        if result.found == CellSearchOutcome::Error {
            error!("cell search reported an error");
            return ProcOutcome::Error;
        }

        if result.found == CellSearchOutcome::CellFound {
            self.collect_serving_plmns(rrc);
        }

        if result.last_freq == LastFreq::NoMoreFreqs {
            info!(nof_plmns = self.found.len(), "PLMN search completed");
            return ProcOutcome::Success;
        }

        // continue with the next frequency
        self.launch_search(rrc)
    }

    fn output(&self) -> Vec<FoundPlmn> {
        self.found.clone()
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<Vec<FoundPlmn>>) {
        if result.is_success() {
            info!(nof_plmns = self.found.len(), "reporting PLMNs to NAS");
            rrc.nas
                .plmn_search_completed(&self.found, self.found.len() as i32);
        } else {
            error!("PLMN search completed with an error");
            rrc.nas.plmn_search_completed(&[], -1);
        }
    }
}
