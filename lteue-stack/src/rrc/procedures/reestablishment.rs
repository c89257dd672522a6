//! Connection reestablishment procedure
//!
//! TS 36.331 Section 5.3.7: after a radio link, handover or reconfiguration
//! failure with AS security active, suspend the bearers, reselect a cell
//! within the T311 window, reacquire SIB1..SIB3 if needed, and send an
//! RRCConnectionReestablishmentRequest once the selection criterion passes.
//! When security is not active the UE moves to idle directly.

use tracing::{error, info};

use crate::proc::{self, ProcOutcome, Procedure};
use crate::rrc::{cell_reselector_slot, serv_cell_cfg_slot, Rrc, MAX_LCID};
use lteue_common::types::{ReestablishmentCause, Rnti};

/// How a reestablishment run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReestOutcome {
    /// Conditions were not met; the UE went to idle directly.
    #[default]
    NotAttempted,
    /// T311 expired before a suitable cell was found; the UE went to idle.
    Aborted,
    /// The reestablishment request was sent and T301 is running.
    RequestSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ReestState {
    #[default]
    CellReselection,
    CellConfiguration,
}

/// Connection reestablishment procedure state.
#[derive(Default)]
pub struct ConnectionReestProc {
    state: ReestState,
    reest_rnti: Rnti,
    reest_cause: Option<ReestablishmentCause>,
    reest_source_pci: u16,
    reest_source_earfcn: u32,
    outcome: ReestOutcome,
}

impl ConnectionReestProc {
    /// TS 36.331 Section 5.3.7.3: actions once a cell was selected while
    /// T311 is running.
    fn cell_criteria(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        let serving_rsrp = rrc.meas_cells.serving_cell().rsrp();
        if rrc.cell_selection_criteria(serving_rsrp) {
            info!(
                elapsed_ms = rrc.timers.time_elapsed(rrc.t311),
                source_earfcn = self.reest_source_earfcn,
                "selection criterion passed, sending RRCConnectionReestablishmentRequest"
            );
            rrc.timers.stop(rrc.t311);
            rrc.timers.run(rrc.t301);
            let cause = self
                .reest_cause
                .unwrap_or(ReestablishmentCause::OtherFailure);
            rrc.send_con_reest_request(cause, self.reest_rnti, self.reest_source_pci);
            self.outcome = ReestOutcome::RequestSent;
            return ProcOutcome::Success;
        }

        if rrc.timers.is_running(rrc.t311) {
            info!("selection criterion failed, relaunching reselection");
            match proc::launch(rrc, cell_reselector_slot, ()) {
                Ok(_) => {
                    self.state = ReestState::CellReselection;
                    ProcOutcome::Yield
                }
                Err(_) => {
                    error!("failed to initiate a cell reselection");
                    ProcOutcome::Error
                }
            }
        } else {
            info!("T311 expired while evaluating the cell, going to idle");
            rrc.start_go_idle();
            self.outcome = ReestOutcome::Aborted;
            ProcOutcome::Success
        }
    }

    fn step_cell_reselection(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, cell_reselector_slot) {
            return ProcOutcome::Yield;
        }

        if !rrc.timers.is_running(rrc.t311) {
            info!("T311 expired during cell reselection, going to idle");
            rrc.start_go_idle();
            self.outcome = ReestOutcome::Aborted;
            return ProcOutcome::Success;
        }

        if rrc.phy_ctrl.is_in_sync() {
            let serving = rrc.meas_cells.serving_cell();
            let has_sibs = serving.has_sib1() && serving.has_sib2() && serving.has_sib3();
            if has_sibs {
                info!("in-sync with SIBs available, evaluating cell criteria");
                return self.cell_criteria(rrc);
            }
            info!("in-sync but SIBs are missing, launching serving cell configuration");
            match proc::launch(rrc, serv_cell_cfg_slot, vec![0, 1, 2]) {
                Ok(_) => self.state = ReestState::CellConfiguration,
                Err(_) => {
                    error!("failed to initiate the serving cell configuration");
                    return ProcOutcome::Error;
                }
            }
        } else {
            info!(
                elapsed_ms = rrc.timers.time_elapsed(rrc.t311),
                duration_ms = rrc.timers.duration(rrc.t311),
                "serving cell out-of-sync, relaunching reselection"
            );
            if proc::launch(rrc, cell_reselector_slot, ()).is_err() {
                return ProcOutcome::Error;
            }
        }
        ProcOutcome::Yield
    }

    fn step_cell_configuration(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, serv_cell_cfg_slot) {
            return ProcOutcome::Yield;
        }

        if !rrc.timers.is_running(rrc.t311) {
            info!("T311 expired during cell configuration, going to idle");
            rrc.start_go_idle();
            self.outcome = ReestOutcome::Aborted;
            return ProcOutcome::Success;
        }

        if rrc.phy_ctrl.is_in_sync() {
            let serving = rrc.meas_cells.serving_cell();
            if serving.has_sib1() && serving.has_sib2() && serving.has_sib3() {
                return self.cell_criteria(rrc);
            }
            error!("failed to configure the serving cell, SIBs missing");
            ProcOutcome::Error
        } else {
            info!("serving cell out-of-sync, relaunching reselection");
            match proc::launch(rrc, cell_reselector_slot, ()) {
                Ok(_) => {
                    self.state = ReestState::CellReselection;
                    ProcOutcome::Yield
                }
                Err(_) => {
                    error!("failed to initiate a cell reselection");
                    ProcOutcome::Error
                }
            }
        }
    }
}

impl Procedure for ConnectionReestProc {
    type Context = Rrc;
    type Args = ReestablishmentCause;
    type Event = ();
    type Output = ReestOutcome;

    const NAME: &'static str = "Connection Reestablishment";

    fn init(&mut self, rrc: &mut Rrc, cause: ReestablishmentCause) -> ProcOutcome {
        info!(%cause, "starting connection reestablishment");
        self.state = ReestState::CellReselection;
        self.outcome = ReestOutcome::NotAttempted;

        // save the current C-RNTI before the MAC reset
        let uernti = rrc.mac.get_rntis();

        let conditions_met =
            rrc.security_is_activated && rrc.state().is_connected() && uernti.crnti != 0;
        if !conditions_met {
            // TS 36.331 Section 5.3.7.1: without activated AS security the
            // UE moves to RRC_IDLE directly
            info!("reestablishment conditions not met, going to idle");
            rrc.start_go_idle();
            self.outcome = ReestOutcome::NotAttempted;
            return ProcOutcome::Success;
        }

        self.reest_rnti = uernti.crnti;
        self.reest_cause = Some(cause);
        self.reest_source_pci = rrc.meas_cells.serving_cell().pci();
        self.reest_source_earfcn = rrc.meas_cells.serving_cell().earfcn();

        info!("reestablishment conditions met, initiating");

        // TS 36.331 Section 5.3.7.2
        rrc.timers.stop(rrc.t310);
        rrc.timers.run(rrc.t311);

        for lcid in 1..=MAX_LCID {
            if rrc.rlc.has_bearer(lcid) {
                rrc.rlc.suspend_bearer(lcid);
            }
        }

        rrc.mac.reset();
        rrc.set_phy_default_pucch_srs();
        rrc.set_mac_dedicated_default();

        match proc::launch(rrc, cell_reselector_slot, ()) {
            Ok(_) => ProcOutcome::Yield,
            Err(_) => {
                error!("failed to initiate a cell reselection");
                ProcOutcome::Error
            }
        }
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match self.state {
            ReestState::CellReselection => self.step_cell_reselection(rrc),
            ReestState::CellConfiguration => self.step_cell_configuration(rrc),
        }
    }

    fn output(&self) -> ReestOutcome {
        self.outcome
    }
}
