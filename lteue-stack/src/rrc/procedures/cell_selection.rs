//! Cell selection procedure
//!
//! Chooses a cell to camp on per TS 36.304 Section 5.2. The serving cell is
//! retried first when it still meets the S-criterion; otherwise the known
//! neighbours are tried in insertion order, and when all of them are
//! exhausted a new cell search is launched. A successful selection is
//! followed by the serving cell configuration over the UE's required SIBs.

use tracing::{debug, error, info, warn};

use crate::interfaces::{CellSearchOutcome, CellSearchResult};
use crate::phy_ctrl::PhySubscriber;
use crate::proc::{self, ProcFuture, ProcOutcome, ProcResult, Procedure};
use crate::rrc::{cell_searcher_slot, conn_req_slot, serv_cell_cfg_slot, Rrc};

use super::connection_request::ConnectionRequestEvent;

/// Outcome of a cell selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsResult {
    /// No suitable cell could be found.
    #[default]
    NoCell,
    /// The UE stayed on (or re-camped on) its serving cell.
    SameCell,
    /// The UE camps on a different cell.
    ChangedCell,
}

impl std::fmt::Display for CsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsResult::NoCell => write!(f, "no cell"),
            CsResult::SameCell => write!(f, "same cell"),
            CsResult::ChangedCell => write!(f, "changed cell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SelectionState {
    #[default]
    CellSelection,
    ServCellCamp,
    CellSearch,
    CellConfig,
}

/// Cell selection procedure state.
#[derive(Default)]
pub struct CellSelectionProc {
    state: SelectionState,
    neigh_index: usize,
    cs_result: CsResult,
    discard_serving: bool,
    serv_cell_select_attempted: bool,
    reused_serving: bool,
    cell_search_fut: ProcFuture<CellSearchResult>,
    serv_cell_cfg_fut: ProcFuture<()>,
}

impl CellSelectionProc {
    /// Re-selects the current serving cell when it is not being camped on.
    fn start_serv_cell_selection(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if rrc.phy_ctrl.is_in_sync() && rrc.phy_ctrl.cell_is_camping() {
            self.cs_result = CsResult::SameCell;
            return ProcOutcome::Success;
        }

        let serving = rrc.meas_cells.serving_cell().phy_cell();
        info!(cell = %serving, "not camping on serving cell, selecting it");

        self.state = SelectionState::ServCellCamp;
        let generation = rrc.procs.cell_selector.generation();
        if !rrc
            .phy_ctrl
            .start_cell_select(serving, PhySubscriber::CellSelection, generation)
        {
            error!("failed to launch PHY cell selection");
            return ProcOutcome::Error;
        }
        self.serv_cell_select_attempted = true;
        ProcOutcome::Yield
    }

    /// Tries the serving cell, then each remaining neighbour, then search.
    fn start_cell_selection(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        // first of all, retry the serving cell if it meets the criteria
        if !self.serv_cell_select_attempted {
            let serving_rsrp = rrc.meas_cells.serving_cell().rsrp();
            if rrc.cell_selection_criteria(serving_rsrp) {
                return self.start_serv_cell_selection(rrc);
            }
            self.serv_cell_select_attempted = true;
        }

        while self.neigh_index < rrc.meas_cells.nof_neighbours() {
            let Some(neighbour) = rrc.meas_cells.neighbour(self.neigh_index) else {
                break;
            };
            let phy_cell = neighbour.phy_cell();
            let rsrp = neighbour.rsrp();
            if rrc.cell_selection_criteria(rsrp) {
                rrc.meas_cells.set_serving(phy_cell, self.discard_serving);
                self.discard_serving = false;
                self.reused_serving = false;
                info!(cell = %phy_cell, "selected cell");

                self.state = SelectionState::CellSelection;
                let generation = rrc.procs.cell_selector.generation();
                if !rrc.phy_ctrl.start_cell_select(
                    phy_cell,
                    PhySubscriber::CellSelection,
                    generation,
                ) {
                    error!("failed to launch PHY cell selection");
                    return ProcOutcome::Error;
                }
                return ProcOutcome::Yield;
            }
            self.neigh_index += 1;
        }

        info!("could not select any known cell, searching new cells");
        match proc::launch(rrc, cell_searcher_slot, ()) {
            Ok(future) => {
                self.cell_search_fut = future;
                self.state = SelectionState::CellSearch;
                self.step_cell_search(rrc)
            }
            Err(_) => ProcOutcome::Error,
        }
    }

    fn launch_serv_cell_config(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        let required_sibs = rrc.cfg.required_sibs.clone();
        match proc::launch(rrc, serv_cell_cfg_slot, required_sibs) {
            Ok(future) => {
                self.serv_cell_cfg_fut = future;
                self.state = SelectionState::CellConfig;
                self.step_cell_config(rrc)
            }
            Err(_) => ProcOutcome::Error,
        }
    }

    fn step_cell_selection(&mut self, rrc: &mut Rrc, cs_ret: bool) -> ProcOutcome {
        if cs_ret {
            let serving_rsrp = rrc.meas_cells.serving_cell().rsrp();
            if rrc.cell_selection_criteria(serving_rsrp) {
                info!("PHY is in sync and the selection criterion passed");
                self.reused_serving = false;
                return self.launch_serv_cell_config(rrc);
            }
            info!("PHY is in sync but the selection criterion did not pass");
            self.cs_result = CsResult::NoCell;
        } else {
            error!("could not camp on the selected cell");
        }

        rrc.meas_cells
            .serving_cell_mut()
            .set_rsrp(f32::NEG_INFINITY);
        self.discard_serving = true;
        self.neigh_index += 1;
        self.start_cell_selection(rrc)
    }

    fn step_serv_cell_camp(&mut self, rrc: &mut Rrc, cs_ret: bool) -> ProcOutcome {
        if cs_ret {
            info!("re-selected the serving cell");
            self.reused_serving = true;
            return self.launch_serv_cell_config(rrc);
        }

        rrc.meas_cells
            .serving_cell_mut()
            .set_rsrp(f32::NEG_INFINITY);
        warn!("could not camp on the serving cell");
        self.start_cell_selection(rrc)
    }

    fn step_cell_search(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, cell_searcher_slot) {
            return ProcOutcome::Yield;
        }
        if self.cell_search_fut.is_error() {
            self.cs_result = CsResult::NoCell;
            return ProcOutcome::Error;
        }
        let found = self.cell_search_fut.value().map(|r| r.found);
        self.cs_result = if found == Some(CellSearchOutcome::CellFound) {
            CsResult::ChangedCell
        } else {
            CsResult::NoCell
        };
        info!("cell search of cell selection completed");
        ProcOutcome::Success
    }

    fn step_cell_config(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, serv_cell_cfg_slot) {
            return ProcOutcome::Yield;
        }
        if self.serv_cell_cfg_fut.is_success() {
            info!("all SIBs of the serving cell obtained successfully");
            self.cs_result = if self.reused_serving {
                CsResult::SameCell
            } else {
                CsResult::ChangedCell
            };
            return ProcOutcome::Success;
        }
        error!("failed to configure the serving cell, resuming selection");
        self.neigh_index += 1;
        self.start_cell_selection(rrc)
    }
}

impl Procedure for CellSelectionProc {
    type Context = Rrc;
    type Args = ();
    type Event = bool;
    type Output = CsResult;

    const NAME: &'static str = "Cell Selection";

    fn init(&mut self, rrc: &mut Rrc, _args: ()) -> ProcOutcome {
        self.state = SelectionState::CellSelection;
        self.neigh_index = 0;
        self.cs_result = CsResult::NoCell;
        self.discard_serving = false;
        self.serv_cell_select_attempted = false;
        self.reused_serving = false;
        self.cell_search_fut = ProcFuture::detached();
        self.serv_cell_cfg_fut = ProcFuture::detached();

        if rrc.meas_cells.nof_neighbours() == 0
            && rrc.phy_ctrl.is_in_sync()
            && rrc.phy_ctrl.cell_is_camping()
        {
            // nothing to select from and we are already camping
            debug!("skipping cell selection, no neighbours and cell is camping");
            self.cs_result = CsResult::SameCell;
            return ProcOutcome::Success;
        }

        info!(
            neighbours = %rrc.meas_cells.print_neighbours(),
            in_sync = rrc.phy_ctrl.is_in_sync(),
            "starting cell selection"
        );
        self.start_cell_selection(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match self.state {
            // these states wait for the PHY completion event
            SelectionState::CellSelection | SelectionState::ServCellCamp => ProcOutcome::Yield,
            SelectionState::CellSearch => self.step_cell_search(rrc),
            SelectionState::CellConfig => self.step_cell_config(rrc),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, cs_ret: bool) -> ProcOutcome {
        match self.state {
            SelectionState::CellSelection => self.step_cell_selection(rrc, cs_ret),
            SelectionState::ServCellCamp => self.step_serv_cell_camp(rrc, cs_ret),
            // the nested cell search issues its own selections
            SelectionState::CellSearch => ProcOutcome::Yield,
            SelectionState::CellConfig => {
                warn!("unexpected cell selection event");
                ProcOutcome::Yield
            }
        }
    }

    fn output(&self) -> CsResult {
        self.cs_result
    }

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<CsResult>) {
        info!(
            success = result.is_success(),
            result = %self.cs_result,
            "cell selection completed"
        );
        // inform an ongoing connection establishment
        if rrc.procs.conn_req.is_running() {
            proc::trigger(
                rrc,
                conn_req_slot,
                ConnectionRequestEvent::CellSelectionComplete(result.clone()),
            );
        }
    }
}
