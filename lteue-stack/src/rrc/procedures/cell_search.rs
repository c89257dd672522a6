//! Cell search procedure
//!
//! Searches for a cell on the current frequency, camps on it and retrieves
//! SIB1 if it has not been acquired yet. The found cell is added to the
//! measurement list with no RSRP yet; the procedure waits for the first
//! valid measurement before deciding whether SIB1 acquisition is needed.

use tracing::{error, info, warn};

use crate::cell::Cell;
use crate::interfaces::{CellSearchOutcome, CellSearchResult};
use crate::phy_ctrl::PhySubscriber;
use crate::proc::{self, ProcFuture, ProcOutcome, Procedure};
use crate::rrc::{si_acquirer_slot, Rrc};

/// Events consumed by the cell search procedure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellSearchEvent {
    /// PHY cell search completed.
    SearchResult(CellSearchResult),
    /// PHY cell selection of the found cell completed.
    SelectResult(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SearchState {
    #[default]
    PhyCellSearch,
    PhyCellSelect,
    WaitMeasurement,
    SiAcquire,
}

/// Cell search procedure state.
#[derive(Default)]
pub struct CellSearchProc {
    state: SearchState,
    search_result: CellSearchResult,
    si_acquire_fut: ProcFuture<()>,
}

impl CellSearchProc {
    fn step_si_acquire(&mut self) -> ProcOutcome {
        if !self.si_acquire_fut.is_complete() {
            return ProcOutcome::Yield;
        }
        if self.si_acquire_fut.is_error() {
            error!("failed to acquire SIB1 of the found cell");
            return ProcOutcome::Error;
        }
        info!("cell search completed successfully");
        ProcOutcome::Success
    }

    fn step_wait_measurement(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if !rrc.meas_cells.serving_cell().rsrp().is_normal() {
            return ProcOutcome::Yield;
        }

        if rrc.meas_cells.serving_cell().has_sib1() {
            info!("cell has SIB1");
            return ProcOutcome::Success;
        }

        info!("cell has no SIB1, obtaining it");
        match proc::launch(rrc, si_acquirer_slot, 0) {
            Ok(future) => {
                self.si_acquire_fut = future;
                self.state = SearchState::SiAcquire;
                self.step_si_acquire()
            }
            Err(_) => {
                error!("SI acquisition already running");
                ProcOutcome::Error
            }
        }
    }

    fn handle_cell_found(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        let Some(found_cell) = self.search_result.found_cell else {
            error!("cell search reported a cell without identity");
            return ProcOutcome::Error;
        };
        info!(cell = %found_cell, "cell found, setting new serving cell");

        // created with NaN RSRP; updated by measurements during SIB search
        if !rrc.meas_cells.add_meas_cell(Cell::new(found_cell)) {
            error!("could not add the found cell");
            return ProcOutcome::Error;
        }
        rrc.meas_cells.set_serving(found_cell, false);

        self.state = SearchState::PhyCellSelect;
        let generation = rrc.procs.cell_searcher.generation();
        if !rrc
            .phy_ctrl
            .start_cell_select(found_cell, PhySubscriber::CellSearch, generation)
        {
            error!("could not start PHY cell selection");
            return ProcOutcome::Error;
        }
        ProcOutcome::Yield
    }
}

impl Procedure for CellSearchProc {
    type Context = Rrc;
    type Args = ();
    type Event = CellSearchEvent;
    type Output = CellSearchResult;

    const NAME: &'static str = "Cell Search";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> ProcOutcome {
        info!("starting cell search");
        self.state = SearchState::PhyCellSearch;
        self.search_result = CellSearchResult::default();
        self.si_acquire_fut = ProcFuture::detached();

        let generation = rrc.procs.cell_searcher.generation();
        if !rrc
            .phy_ctrl
            .start_cell_search(PhySubscriber::CellSearch, generation)
        {
            warn!("failed to initiate cell search");
            return ProcOutcome::Error;
        }
        ProcOutcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match self.state {
            // waiting for the PHY completion events
            SearchState::PhyCellSearch | SearchState::PhyCellSelect => ProcOutcome::Yield,
            SearchState::WaitMeasurement => self.step_wait_measurement(rrc),
            SearchState::SiAcquire => self.step_si_acquire(),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, event: CellSearchEvent) -> ProcOutcome {
        match event {
            CellSearchEvent::SearchResult(result) => {
                if self.state != SearchState::PhyCellSearch {
                    error!("unexpected cell search result");
                    return ProcOutcome::Error;
                }
                self.search_result = result;
                match result.found {
                    CellSearchOutcome::CellFound => self.handle_cell_found(rrc),
                    CellSearchOutcome::CellNotFound => {
                        info!("no cell found on this frequency");
                        ProcOutcome::Success
                    }
                    CellSearchOutcome::Error => ProcOutcome::Error,
                }
            }
            CellSearchEvent::SelectResult(cs_ret) => {
                if self.state != SearchState::PhyCellSelect {
                    warn!("unexpected cell select result");
                    return ProcOutcome::Yield;
                }
                if !cs_ret {
                    error!("could not select the found cell");
                    return ProcOutcome::Error;
                }
                if !rrc.phy_ctrl.cell_is_camping() {
                    warn!("could not camp on the found cell");
                    return ProcOutcome::Error;
                }
                if !rrc.meas_cells.serving_cell().rsrp().is_normal() {
                    info!("no valid measurement for the serving cell yet, waiting");
                }
                self.state = SearchState::WaitMeasurement;
                self.step_wait_measurement(rrc)
            }
        }
    }

    fn output(&self) -> CellSearchResult {
        self.search_result
    }
}
