//! Connection request procedure
//!
//! Establishes an RRC connection on NAS request: selects a cell, configures
//! it over the required SIBs, sends the RRCConnectionRequest and supervises
//! the reply with T300. T300 stopping while CONNECTED means the setup was
//! received; T300 expiry or a stop without CONNECTED (a reject) fails the
//! establishment and resets MAC and RLC.

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::proc::{self, ProcFuture, ProcOutcome, ProcResult, Procedure};
use crate::rrc::state::RrcTransition;
use crate::rrc::{cell_selector_slot, serv_cell_cfg_slot, ProcId, Rrc};
use lteue_common::types::{BarringKind, EstablishmentCause};

use super::cell_selection::CsResult;

/// Events consumed by the connection request procedure.
#[derive(Debug, Clone)]
pub enum ConnectionRequestEvent {
    /// The cell selection procedure completed.
    CellSelectionComplete(ProcResult<CsResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConnReqState {
    #[default]
    CellSelection,
    ConfigServingCell,
    WaitT300,
}

/// Connection request procedure state.
#[derive(Default)]
pub struct ConnectionRequestProc {
    cause: Option<EstablishmentCause>,
    dedicated_info_nas: Option<Bytes>,
    cs_ret: CsResult,
    state: ConnReqState,
    serv_cfg_fut: ProcFuture<()>,
}

impl ConnectionRequestProc {
    fn handle_cell_selection_complete(
        &mut self,
        rrc: &mut Rrc,
        result: ProcResult<CsResult>,
    ) -> ProcOutcome {
        let ProcResult::Success(cs_ret) = result else {
            return ProcOutcome::Error;
        };
        self.cs_ret = cs_ret;

        if !rrc.phy_ctrl.cell_is_camping() {
            match self.cs_ret {
                CsResult::SameCell => warn!("did not reselect but serving cell is out-of-sync"),
                CsResult::ChangedCell => {
                    warn!("selected a new cell but could not camp on it")
                }
                CsResult::NoCell => warn!("could not find any suitable cell to connect to"),
            }
            return ProcOutcome::Error;
        }

        rrc.set_phy_default();
        rrc.set_mac_default();

        info!("configuring serving cell");
        let required_sibs = rrc.cfg.required_sibs.clone();
        match proc::launch(rrc, serv_cell_cfg_slot, required_sibs) {
            Ok(future) => {
                self.serv_cfg_fut = future;
                self.state = ConnReqState::ConfigServingCell;
                self.step_config_serving_cell(rrc)
            }
            Err(_) => {
                error!("failed to configure the serving cell");
                ProcOutcome::Error
            }
        }
    }

    fn step_config_serving_cell(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, serv_cell_cfg_slot) {
            return ProcOutcome::Yield;
        }
        if !self.serv_cfg_fut.is_success() {
            error!("configuring the serving cell failed");
            return ProcOutcome::Error;
        }

        rrc.timers.run(rrc.t300);

        let cause = self.cause.unwrap_or(EstablishmentCause::MoData);
        rrc.send_con_request(cause);

        // hand the dedicated NAS PDU over for the setup complete message
        if let Some(nas_pdu) = self.dedicated_info_nas.take() {
            if rrc.dedicated_info_nas.is_some() {
                warn!("replacing a queued dedicatedInfoNAS PDU");
            }
            debug!("updating dedicatedInfoNAS");
            rrc.dedicated_info_nas = Some(nas_pdu);
        } else {
            debug!("dedicatedInfoNAS already provided");
        }

        info!("waiting for RRCConnectionSetup/Reject or T300 expiry");
        self.state = ConnReqState::WaitT300;
        self.step_wait_t300(rrc)
    }

    fn step_wait_t300(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if rrc.timers.is_running(rrc.t300) {
            return ProcOutcome::Yield;
        }

        if rrc.state().is_connected() {
            // RRCConnectionSetup received
            return ProcOutcome::Success;
        }

        if rrc.timers.is_expired(rrc.t300) {
            warn!("T300 expired: connection request timed out");
            rrc.mac.reset();
            rrc.set_mac_default();
            rrc.rlc.reestablish();
        } else {
            warn!("T300 stopped: RRCConnectionReject received");
            rrc.mac.reset();
            rrc.set_mac_default();
        }
        ProcOutcome::Error
    }
}

impl Procedure for ConnectionRequestProc {
    type Context = Rrc;
    type Args = (EstablishmentCause, Option<Bytes>);
    type Event = ConnectionRequestEvent;
    type Output = ();

    const NAME: &'static str = "Connection Request";

    fn init(
        &mut self,
        rrc: &mut Rrc,
        (cause, dedicated_info_nas): (EstablishmentCause, Option<Bytes>),
    ) -> ProcOutcome {
        self.cause = Some(cause);
        self.dedicated_info_nas = dedicated_info_nas;
        self.cs_ret = CsResult::NoCell;
        self.state = ConnReqState::CellSelection;
        self.serv_cfg_fut = ProcFuture::detached();

        if !rrc.plmn_is_selected {
            error!("trying to connect but no PLMN is selected");
            return ProcOutcome::Error;
        }
        if !rrc.state().is_idle() {
            warn!(state = %rrc.state(), "connection establishment requested while not in IDLE");
            return ProcOutcome::Error;
        }
        if rrc.timers.is_running(rrc.t302) {
            info!("connection establishment requested while T302 is running");
            rrc.nas.set_barring(BarringKind::MoData);
            return ProcOutcome::Error;
        }

        info!(%cause, "initiating connection establishment");

        if rrc.procs.cell_selector.is_idle() {
            let future = match proc::launch(rrc, cell_selector_slot, ()) {
                Ok(future) => future,
                Err(_) => {
                    error!("failed to initiate cell selection");
                    return ProcOutcome::Error;
                }
            };
            rrc.add_to_callback_list(ProcId::CellSelection);
            // the selection may have completed synchronously
            if future.is_complete() {
                let result = match future.value() {
                    Some(cs_ret) => ProcResult::Success(cs_ret),
                    None => ProcResult::Error,
                };
                return self.handle_cell_selection_complete(rrc, result);
            }
        } else {
            info!("cell selection already on-going, waiting for its result");
        }
        ProcOutcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match self.state {
            // cell selection signals back with an event
            ConnReqState::CellSelection => ProcOutcome::Yield,
            ConnReqState::ConfigServingCell => self.step_config_serving_cell(rrc),
            ConnReqState::WaitT300 => self.step_wait_t300(rrc),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, event: ConnectionRequestEvent) -> ProcOutcome {
        match event {
            ConnectionRequestEvent::CellSelectionComplete(result) => {
                if self.state != ConnReqState::CellSelection {
                    // not expecting a cell selection result
                    return ProcOutcome::Yield;
                }
                self.handle_cell_selection_complete(rrc, result)
            }
        }
    }

    fn output(&self) -> Self::Output {}

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        if result.is_error() {
            warn!("could not establish connection, deallocating dedicatedInfoNAS PDU");
            self.dedicated_info_nas = None;
            rrc.dedicated_info_nas = None;
            if rrc.state().is_connecting() {
                let _ = rrc.state.transition(RrcTransition::ConnectionFailure);
            }
        } else {
            info!("connection request procedure finished successfully");
        }
        rrc.nas.connection_request_completed(result.is_success());
    }
}
