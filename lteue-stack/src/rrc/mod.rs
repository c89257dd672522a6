//! RRC procedure engine for the UE
//!
//! This module owns the control-plane state of the UE (RRC state machine,
//! serving/neighbour cells, security context, timers) and the set of
//! cooperative procedures that drive it through the LTE lifecycle: cell
//! search, SI acquisition, cell selection/reselection, connection
//! establishment, paging, transition to idle, reestablishment and intra-LTE
//! handover.
//!
//! The engine runs one scheduler turn per TTI: pending procedures on the
//! callback list are stepped once, then the timer service advances and
//! expired timer ids are routed to their owners. Asynchronous completions
//! from PHY/MAC/NAS enter through the `*_completed` entry points and are
//! routed to the procedure that subscribed to them.
//!
//! # Reference
//! - 3GPP TS 36.331: E-UTRA; RRC protocol specification
//! - 3GPP TS 36.304: E-UTRA; UE procedures in idle mode

pub mod procedures;
pub mod state;

use bytes::Bytes;
use tracing::{debug, info, warn};

use lteue_common::config::UeConfig;
use lteue_common::logging::{log_rrc_message, Direction};
use lteue_common::types::{
    BarringKind, EstablishmentCause, Plmn, PhyCell, ReestablishmentCause, STmsi,
};

use crate::cell::MeasCellList;
use crate::interfaces::{
    CellSearchResult, MacInterface, NasInterface, PdcpInterface, PhyInterface, RlcInterface,
    SecurityContext, UsimInterface,
};
use crate::messages::{
    uplink, MeasConfig, Paging, RrConfigCommon, RrcConnectionReconfiguration, SibMessage,
};
use crate::phy_ctrl::{PhyController, PhySubscriber};
use crate::proc::{self, ProcBusy, ProcHandle};
use crate::timers::{TimerId, TimerService};

use self::procedures::cell_reselection::CellReselectionProc;
use self::procedures::cell_search::{CellSearchEvent, CellSearchProc};
use self::procedures::cell_selection::CellSelectionProc;
use self::procedures::connection_request::ConnectionRequestProc;
use self::procedures::go_idle::GoIdleProc;
use self::procedures::handover::{HandoverEvent, HandoverProc};
use self::procedures::plmn_search::PlmnSearchProc;
use self::procedures::process_pcch::ProcessPcchProc;
use self::procedures::reestablishment::ConnectionReestProc;
use self::procedures::serving_cell_config::ServingCellConfigProc;
use self::procedures::si_acquire::{SiAcquireEvent, SiAcquireProc};

use self::state::{RrcState, RrcStateMachine, RrcTransition};

/// LCID of SRB0 (CCCH).
pub const LCID_SRB0: u32 = 0;
/// LCID of SRB1 (DCCH).
pub const LCID_SRB1: u32 = 1;
/// LCID of SRB2 (DCCH, high priority NAS).
pub const LCID_SRB2: u32 = 2;
/// Highest LCID considered when suspending bearers at reestablishment.
pub const MAX_LCID: u32 = 10;

/// Identifies a procedure handle for callback-list bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcId {
    CellSearch,
    SiAcquire,
    ServingCellConfig,
    CellSelection,
    PlmnSearch,
    ConnectionRequest,
    ProcessPcch,
    GoIdle,
    CellReselection,
    ConnectionReest,
    Handover,
}

impl std::fmt::Display for ProcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcId::CellSearch => "Cell Search",
            ProcId::SiAcquire => "SI Acquire",
            ProcId::ServingCellConfig => "Serving Cell Configuration",
            ProcId::CellSelection => "Cell Selection",
            ProcId::PlmnSearch => "PLMN Search",
            ProcId::ConnectionRequest => "Connection Request",
            ProcId::ProcessPcch => "Process PCCH",
            ProcId::GoIdle => "Go Idle",
            ProcId::CellReselection => "Cell Reselection",
            ProcId::ConnectionReest => "Connection Reestablishment",
            ProcId::Handover => "Handover",
        };
        write!(f, "{name}")
    }
}

/// Connection-control timers exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrcTimer {
    T300,
    T301,
    T302,
    T304,
    T310,
    T311,
}

/// Snapshot of the engine state for metrics reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrcMetrics {
    pub state: RrcState,
    pub serving_cell: PhyCell,
    pub serving_rsrp_dbm: f32,
    pub nof_neighbours: usize,
}

/// All procedure handles of the engine.
pub struct ProcSet {
    pub cell_searcher: ProcHandle<CellSearchProc>,
    pub si_acquirer: ProcHandle<SiAcquireProc>,
    pub serv_cell_cfg: ProcHandle<ServingCellConfigProc>,
    pub cell_selector: ProcHandle<CellSelectionProc>,
    pub plmn_searcher: ProcHandle<PlmnSearchProc>,
    pub conn_req: ProcHandle<ConnectionRequestProc>,
    pub pcch_processor: ProcHandle<ProcessPcchProc>,
    pub idle_setter: ProcHandle<GoIdleProc>,
    pub cell_reselector: ProcHandle<CellReselectionProc>,
    pub conn_reest: ProcHandle<ConnectionReestProc>,
    pub ho_handler: ProcHandle<HandoverProc>,
}

impl ProcSet {
    fn new(timers: &mut TimerService<Rrc>) -> Self {
        Self {
            cell_searcher: ProcHandle::new(CellSearchProc::default()),
            si_acquirer: ProcHandle::new(SiAcquireProc::new(timers)),
            serv_cell_cfg: ProcHandle::new(ServingCellConfigProc::default()),
            cell_selector: ProcHandle::new(CellSelectionProc::default()),
            plmn_searcher: ProcHandle::new(PlmnSearchProc::default()),
            conn_req: ProcHandle::new(ConnectionRequestProc::default()),
            pcch_processor: ProcHandle::new(ProcessPcchProc::default()),
            idle_setter: ProcHandle::new(GoIdleProc::new(timers)),
            cell_reselector: ProcHandle::new(CellReselectionProc::new(timers)),
            conn_reest: ProcHandle::new(ConnectionReestProc::default()),
            ho_handler: ProcHandle::new(HandoverProc::default()),
        }
    }
}

// Slot projections used with the procedure runtime. Plain functions so the
// runtime can reborrow the engine without aliasing the handle being driven.
pub(crate) fn cell_searcher_slot(rrc: &mut Rrc) -> &mut ProcHandle<CellSearchProc> {
    &mut rrc.procs.cell_searcher
}
pub(crate) fn si_acquirer_slot(rrc: &mut Rrc) -> &mut ProcHandle<SiAcquireProc> {
    &mut rrc.procs.si_acquirer
}
pub(crate) fn serv_cell_cfg_slot(rrc: &mut Rrc) -> &mut ProcHandle<ServingCellConfigProc> {
    &mut rrc.procs.serv_cell_cfg
}
pub(crate) fn cell_selector_slot(rrc: &mut Rrc) -> &mut ProcHandle<CellSelectionProc> {
    &mut rrc.procs.cell_selector
}
pub(crate) fn plmn_searcher_slot(rrc: &mut Rrc) -> &mut ProcHandle<PlmnSearchProc> {
    &mut rrc.procs.plmn_searcher
}
pub(crate) fn conn_req_slot(rrc: &mut Rrc) -> &mut ProcHandle<ConnectionRequestProc> {
    &mut rrc.procs.conn_req
}
pub(crate) fn pcch_processor_slot(rrc: &mut Rrc) -> &mut ProcHandle<ProcessPcchProc> {
    &mut rrc.procs.pcch_processor
}
pub(crate) fn idle_setter_slot(rrc: &mut Rrc) -> &mut ProcHandle<GoIdleProc> {
    &mut rrc.procs.idle_setter
}
pub(crate) fn cell_reselector_slot(rrc: &mut Rrc) -> &mut ProcHandle<CellReselectionProc> {
    &mut rrc.procs.cell_reselector
}
pub(crate) fn conn_reest_slot(rrc: &mut Rrc) -> &mut ProcHandle<ConnectionReestProc> {
    &mut rrc.procs.conn_reest
}
pub(crate) fn ho_slot(rrc: &mut Rrc) -> &mut ProcHandle<HandoverProc> {
    &mut rrc.procs.ho_handler
}

/// The UE RRC engine.
pub struct Rrc {
    pub(crate) cfg: UeConfig,
    pub(crate) state: RrcStateMachine,
    pub(crate) meas_cells: MeasCellList,
    pub(crate) timers: TimerService<Rrc>,
    pub(crate) phy_ctrl: PhyController,
    pub(crate) mac: Box<dyn MacInterface>,
    pub(crate) rlc: Box<dyn RlcInterface>,
    pub(crate) pdcp: Box<dyn PdcpInterface>,
    pub(crate) nas: Box<dyn NasInterface>,
    pub(crate) usim: Box<dyn UsimInterface>,
    pub(crate) procs: ProcSet,
    callback_list: Vec<ProcId>,
    pub(crate) current_tti: u32,

    // connection-control timers
    pub(crate) t300: TimerId,
    pub(crate) t301: TimerId,
    pub(crate) t302: TimerId,
    pub(crate) t304: TimerId,
    pub(crate) t310: TimerId,
    pub(crate) t311: TimerId,

    // connection state
    pub(crate) plmn_is_selected: bool,
    pub(crate) selected_plmn: Option<Plmn>,
    pub(crate) ue_identity: Option<STmsi>,
    pub(crate) dedicated_info_nas: Option<Bytes>,
    pub(crate) sec_cfg: SecurityContext,
    pub(crate) security_is_activated: bool,
    pub(crate) meas_cfg: Option<MeasConfig>,
}

impl Rrc {
    /// Builds the engine around its collaborators.
    pub fn new(
        cfg: UeConfig,
        phy: Box<dyn PhyInterface>,
        mac: Box<dyn MacInterface>,
        rlc: Box<dyn RlcInterface>,
        pdcp: Box<dyn PdcpInterface>,
        nas: Box<dyn NasInterface>,
        usim: Box<dyn UsimInterface>,
    ) -> Self {
        let mut timers = TimerService::new();
        let t300 = timers.get_unique_timer();
        let t301 = timers.get_unique_timer();
        let t302 = timers.get_unique_timer();
        let t304 = timers.get_unique_timer();
        let t310 = timers.get_unique_timer();
        let t311 = timers.get_unique_timer();
        timers.set(t300, cfg.t300_ms);
        timers.set(t301, cfg.t301_ms);
        timers.set(t310, cfg.t310_ms);
        timers.set(t311, cfg.t311_ms);

        let procs = ProcSet::new(&mut timers);
        let meas_cells = MeasCellList::new(cfg.max_neighbours);

        Self {
            cfg,
            state: RrcStateMachine::new(),
            meas_cells,
            timers,
            phy_ctrl: PhyController::new(phy),
            mac,
            rlc,
            pdcp,
            nas,
            usim,
            procs,
            callback_list: Vec::new(),
            current_tti: 0,
            t300,
            t301,
            t302,
            t304,
            t310,
            t311,
            plmn_is_selected: false,
            selected_plmn: None,
            ue_identity: None,
            dedicated_info_nas: None,
            sec_cfg: SecurityContext::default(),
            security_is_activated: false,
            meas_cfg: None,
        }
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Current RRC state.
    pub fn state(&self) -> RrcState {
        self.state.state()
    }

    /// True in RRC_CONNECTED.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The serving/neighbour cell model.
    pub fn meas_cells(&self) -> &MeasCellList {
        &self.meas_cells
    }

    /// Mutable access to the cell model.
    pub fn meas_cells_mut(&mut self) -> &mut MeasCellList {
        &mut self.meas_cells
    }

    /// The procedure handle set.
    pub fn procs(&self) -> &ProcSet {
        &self.procs
    }

    /// True when the given connection-control timer is armed.
    pub fn timer_is_running(&self, timer: RrcTimer) -> bool {
        self.timers.is_running(self.timer_id(timer))
    }

    /// True when the given connection-control timer ran to expiry.
    pub fn timer_is_expired(&self, timer: RrcTimer) -> bool {
        self.timers.is_expired(self.timer_id(timer))
    }

    fn timer_id(&self, timer: RrcTimer) -> TimerId {
        match timer {
            RrcTimer::T300 => self.t300,
            RrcTimer::T301 => self.t301,
            RrcTimer::T302 => self.t302,
            RrcTimer::T304 => self.t304,
            RrcTimer::T310 => self.t310,
            RrcTimer::T311 => self.t311,
        }
    }

    /// Metrics snapshot.
    pub fn get_metrics(&self) -> RrcMetrics {
        let serving = self.meas_cells.serving_cell();
        RrcMetrics {
            state: self.state(),
            serving_cell: serving.phy_cell(),
            serving_rsrp_dbm: serving.rsrp(),
            nof_neighbours: self.meas_cells.nof_neighbours(),
        }
    }

    /// True once AS security has been activated for this connection.
    pub fn security_is_activated(&self) -> bool {
        self.security_is_activated
    }

    /// The measurement configuration applied by the last reconfiguration.
    pub fn meas_config(&self) -> Option<&MeasConfig> {
        self.meas_cfg.as_ref()
    }

    // ========================================================================
    // Configuration entry points
    // ========================================================================

    /// Records the PLMN selected by NAS, enabling connection establishment.
    pub fn plmn_select(&mut self, plmn: Plmn) {
        info!(%plmn, "PLMN selected");
        self.selected_plmn = Some(plmn);
        self.plmn_is_selected = true;
    }

    /// Sets the UE paging identity.
    pub fn set_ue_identity(&mut self, s_tmsi: STmsi) {
        info!(%s_tmsi, "UE identity set");
        self.ue_identity = Some(s_tmsi);
    }

    /// Installs AS security material and activates security. The activation
    /// flag only moves back to false when the connection is left.
    pub fn apply_security_config(&mut self, sec: SecurityContext) {
        self.sec_cfg = sec;
        self.security_is_activated = true;
    }

    // ========================================================================
    // Procedure entry points
    // ========================================================================

    /// NAS request to establish an RRC connection.
    pub fn start_connection_request(
        &mut self,
        cause: EstablishmentCause,
        dedicated_info_nas: Option<Bytes>,
    ) -> bool {
        match proc::launch(self, conn_req_slot, (cause, dedicated_info_nas)) {
            Ok(_) => {
                self.add_to_callback_list(ProcId::ConnectionRequest);
                true
            }
            Err(ProcBusy) => {
                warn!("connection request already in progress");
                false
            }
        }
    }

    /// NAS request to search all frequencies for PLMNs.
    pub fn start_plmn_search(&mut self) -> bool {
        match proc::launch(self, plmn_searcher_slot, ()) {
            Ok(_) => {
                self.add_to_callback_list(ProcId::PlmnSearch);
                true
            }
            Err(ProcBusy) => {
                warn!("PLMN search already in progress");
                false
            }
        }
    }

    /// Starts the transition to RRC_IDLE.
    pub fn start_go_idle(&mut self) {
        match proc::launch(self, idle_setter_slot, ()) {
            Ok(_) => self.add_to_callback_list(ProcId::GoIdle),
            Err(ProcBusy) => debug!("go-idle already in progress"),
        }
    }

    /// Starts the connection reestablishment procedure.
    pub fn start_connection_reest(&mut self, cause: ReestablishmentCause) {
        match proc::launch(self, conn_reest_slot, cause) {
            Ok(_) => self.add_to_callback_list(ProcId::ConnectionReest),
            Err(ProcBusy) => warn!("reestablishment already in progress"),
        }
    }

    /// Starts a serving cell configuration over the given SIB list.
    pub fn start_serving_cell_config(&mut self, required_sibs: Vec<u32>) -> bool {
        match proc::launch(self, serv_cell_cfg_slot, required_sibs) {
            Ok(_) => {
                self.add_to_callback_list(ProcId::ServingCellConfig);
                true
            }
            Err(ProcBusy) => {
                warn!("serving cell configuration already in progress");
                false
            }
        }
    }

    /// Handles a decoded Paging message from PCCH.
    pub fn paging(&mut self, paging: Paging) {
        match proc::launch(self, pcch_processor_slot, paging) {
            Ok(_) => self.add_to_callback_list(ProcId::ProcessPcch),
            Err(ProcBusy) => warn!("paging processing already in progress"),
        }
    }

    /// Handles a decoded RRCConnectionReconfiguration.
    pub fn handle_reconfiguration(&mut self, recfg: RrcConnectionReconfiguration) {
        if recfg.mobility_control_info.is_some() {
            match proc::launch(self, ho_slot, recfg) {
                Ok(_) => self.add_to_callback_list(ProcId::Handover),
                Err(ProcBusy) => {
                    warn!("handover already in progress, rejecting reconfiguration");
                    self.con_reconfig_failed();
                }
            }
            return;
        }
        // plain reconfiguration: apply and acknowledge
        if recfg.rr_cfg_ded_present {
            self.apply_rr_config_dedicated();
        }
        let serving_earfcn = self.meas_cells.serving_cell().earfcn();
        self.parse_meas_config(&recfg, serving_earfcn);
        self.send_reconfig_complete(recfg.transaction_id);
    }

    /// Relaunches the periodic cell reselection procedure.
    pub(crate) fn relaunch_cell_reselection(&mut self) {
        match proc::launch(self, cell_reselector_slot, ()) {
            Ok(_) => self.add_to_callback_list(ProcId::CellReselection),
            Err(ProcBusy) => debug!("cell reselection already in progress"),
        }
    }

    // ========================================================================
    // Downlink message entry points
    // ========================================================================

    /// RRCConnectionSetup received: finish the establishment.
    pub fn connection_setup(&mut self) {
        if !self.state().is_connecting() {
            warn!(state = %self.state(), "RRCConnectionSetup ignored");
            return;
        }
        self.timers.stop(self.t300);
        if let Err(e) = self.state.transition(RrcTransition::ConnectionSetup) {
            warn!(%e, "connection setup");
            return;
        }
        info!("RRC connection established");
        // 1-based index of the selected PLMN within the serving cell's SIB1
        let selected_plmn_index = self
            .selected_plmn
            .and_then(|plmn| {
                self.meas_cells
                    .serving_cell()
                    .sib1()
                    .and_then(|sib1| sib1.plmns.iter().position(|p| *p == plmn))
            })
            .map_or(1, |index| index as u8 + 1);
        let nas_pdu = self.dedicated_info_nas.take().unwrap_or_default();
        let pdu = uplink::build_setup_complete(selected_plmn_index, &nas_pdu);
        log_rrc_message(Direction::Tx, "RRCConnectionSetupComplete", &pdu);
        self.pdcp.write_sdu(LCID_SRB1, pdu, true);
    }

    /// RRCConnectionReject received: stop T300 and bar access for the wait
    /// time. The connection request procedure observes the stopped timer.
    pub fn connection_reject(&mut self, wait_time_s: u32) {
        if !self.state().is_connecting() {
            warn!(state = %self.state(), "RRCConnectionReject ignored");
            return;
        }
        info!(wait_time_s, "RRCConnectionReject received");
        self.timers.stop(self.t300);
        if wait_time_s > 0 {
            self.timers.set(self.t302, wait_time_s * 1000);
            self.timers.run(self.t302);
            self.nas.set_barring(BarringKind::MoData);
        }
    }

    /// RRCConnectionReestablishment received: the request was accepted.
    pub fn connection_reest_complete(&mut self) {
        info!("RRCConnectionReestablishment received");
        self.timers.stop(self.t301);
    }

    /// RRCConnectionReestablishmentReject received: give up and go idle.
    pub fn connection_reest_reject(&mut self) {
        warn!("RRCConnectionReestablishmentReject received");
        self.timers.stop(self.t301);
        self.start_go_idle();
    }

    /// A decoded system information block arrived for the serving cell.
    pub fn handle_sib(&mut self, sib: SibMessage) {
        let index = sib.index();
        info!(sib = index + 1, "system information received");
        match sib {
            SibMessage::Sib1(s) => self.meas_cells.serving_cell_mut().set_sib1(s),
            SibMessage::Sib2(s) => {
                self.meas_cells.serving_cell_mut().set_sib2(s);
                self.handle_sib2();
            }
            SibMessage::Sib3(s) => self.meas_cells.serving_cell_mut().set_sib3(s),
            SibMessage::Sib13(s) => {
                self.meas_cells.serving_cell_mut().set_sib13(s);
                self.handle_sib13();
            }
            SibMessage::Other(i) => self.meas_cells.serving_cell_mut().set_sib(i),
        }
        if self.procs.si_acquirer.is_running() {
            proc::trigger(self, si_acquirer_slot, SiAcquireEvent::SibReceived);
        }
    }

    /// Applies the connection-control configuration of the acquired SIB2.
    pub(crate) fn handle_sib2(&mut self) {
        let Some(sib2) = self.meas_cells.serving_cell().sib2().copied() else {
            return;
        };
        let t = sib2.ue_timers;
        info!(
            t300 = t.t300_ms,
            t301 = t.t301_ms,
            t310 = t.t310_ms,
            t311 = t.t311_ms,
            "applying SIB2 connection control configuration"
        );
        // an armed timer keeps its current arming; the new duration applies
        // from the next run
        for (id, duration) in [
            (self.t300, t.t300_ms),
            (self.t301, t.t301_ms),
            (self.t310, t.t310_ms),
            (self.t311, t.t311_ms),
        ] {
            if !self.timers.is_running(id) {
                self.timers.set(id, duration);
            }
        }
    }

    /// Records MBMS control channel presence from SIB13.
    pub(crate) fn handle_sib13(&mut self) {
        let mcch = self
            .meas_cells
            .serving_cell()
            .sib13()
            .is_some_and(|s| s.mcch_present);
        info!(mcch, "SIB13 received");
    }

    // ========================================================================
    // Asynchronous completion entry points
    // ========================================================================

    /// PHY cell search completed.
    pub fn cell_search_completed(&mut self, result: CellSearchResult) {
        match self.phy_ctrl.take_search_subscriber() {
            Some((PhySubscriber::CellSearch, generation))
                if self.procs.cell_searcher.is_running()
                    && self.procs.cell_searcher.generation() == generation =>
            {
                proc::trigger(self, cell_searcher_slot, CellSearchEvent::SearchResult(result));
            }
            Some((subscriber, _)) => {
                warn!(%subscriber, "cell search completion for stale subscriber dropped")
            }
            None => warn!("unsolicited cell search completion dropped"),
        }
    }

    /// PHY cell selection completed.
    pub fn cell_select_completed(&mut self, cs_ret: bool) {
        match self.phy_ctrl.take_select_subscriber() {
            Some((PhySubscriber::CellSearch, generation))
                if self.procs.cell_searcher.is_running()
                    && self.procs.cell_searcher.generation() == generation =>
            {
                proc::trigger(self, cell_searcher_slot, CellSearchEvent::SelectResult(cs_ret));
            }
            Some((PhySubscriber::CellSelection, generation))
                if self.procs.cell_selector.is_running()
                    && self.procs.cell_selector.generation() == generation =>
            {
                proc::trigger(self, cell_selector_slot, cs_ret);
            }
            Some((PhySubscriber::Handover, generation))
                if self.procs.ho_handler.is_running()
                    && self.procs.ho_handler.generation() == generation =>
            {
                proc::trigger(self, ho_slot, HandoverEvent::CellSelectResult(cs_ret));
            }
            Some((subscriber, _)) => {
                warn!(%subscriber, "cell select completion for stale subscriber dropped")
            }
            None => warn!("unsolicited cell select completion dropped"),
        }
    }

    /// MAC random access completed (handover).
    pub fn ra_completed(&mut self, success: bool) {
        if self.procs.ho_handler.is_running() {
            proc::trigger(self, ho_slot, HandoverEvent::RaCompleted(success));
        } else {
            debug!(success, "RA completion with no handover in progress");
        }
    }

    /// NAS finished servicing a page.
    pub fn paging_complete(&mut self, ok: bool) {
        proc::trigger(self, pcch_processor_slot, ok);
    }

    /// PHY sync reports in-sync.
    pub fn in_sync(&mut self) {
        debug!("in-sync");
        if self.timers.is_running(self.t310) {
            info!("T310 stopped on in-sync");
            self.timers.stop(self.t310);
        }
    }

    /// PHY sync reports out-of-sync; starts radio link failure detection.
    pub fn out_of_sync(&mut self) {
        if self.state().is_connected()
            && !self.timers.is_running(self.t310)
            && !self.timers.is_running(self.t311)
        {
            info!("out-of-sync in RRC_CONNECTED, starting T310");
            self.timers.run(self.t310);
        } else {
            debug!("out-of-sync");
        }
    }

    /// New RSRP measurement from the PHY.
    pub fn new_cell_meas(&mut self, earfcn: u32, pci: u16, rsrp_dbm: f32) {
        debug!(earfcn, pci, rsrp_dbm, "new measurement");
        self.meas_cells.new_cell_meas(earfcn, pci, rsrp_dbm);
    }

    // ========================================================================
    // Scheduler turn
    // ========================================================================

    /// One engine turn: steps every procedure on the callback list once.
    pub fn run_tti(&mut self, tti: u32) {
        self.current_tti = tti;
        self.step_callback_list();
    }

    /// Advances the timer service by one millisecond and routes expiries.
    pub fn step_timers(&mut self) {
        for id in self.timers.step_all() {
            self.timer_expired(id);
        }
    }

    pub(crate) fn add_to_callback_list(&mut self, id: ProcId) {
        if !self.callback_list.contains(&id) {
            self.callback_list.push(id);
        }
    }

    fn step_callback_list(&mut self) {
        let list = std::mem::take(&mut self.callback_list);
        let mut still_running = Vec::with_capacity(list.len());
        for id in list {
            if self.run_proc_by_id(id) {
                still_running.push(id);
            }
        }
        // procedures launched during this turn were appended meanwhile
        for id in std::mem::take(&mut self.callback_list) {
            if !still_running.contains(&id) {
                still_running.push(id);
            }
        }
        self.callback_list = still_running;
    }

    fn run_proc_by_id(&mut self, id: ProcId) -> bool {
        match id {
            ProcId::CellSearch => proc::run(self, cell_searcher_slot),
            ProcId::SiAcquire => proc::run(self, si_acquirer_slot),
            ProcId::ServingCellConfig => proc::run(self, serv_cell_cfg_slot),
            ProcId::CellSelection => proc::run(self, cell_selector_slot),
            ProcId::PlmnSearch => proc::run(self, plmn_searcher_slot),
            ProcId::ConnectionRequest => proc::run(self, conn_req_slot),
            ProcId::ProcessPcch => proc::run(self, pcch_processor_slot),
            ProcId::GoIdle => proc::run(self, idle_setter_slot),
            ProcId::CellReselection => proc::run(self, cell_reselector_slot),
            ProcId::ConnectionReest => proc::run(self, conn_reest_slot),
            ProcId::Handover => proc::run(self, ho_slot),
        }
    }

    fn timer_expired(&mut self, id: TimerId) {
        if let Some(callback) = self.timers.take_deferred(id) {
            callback(self);
            return;
        }
        if id == self.t300 {
            // the connection request procedure polls T300
            warn!("T300 expired");
            return;
        }
        if id == self.t301 {
            warn!("T301 expired, going to idle");
            self.start_go_idle();
            return;
        }
        if id == self.t302 {
            info!("T302 expired, lifting access barring");
            self.nas.set_barring(BarringKind::None);
            return;
        }
        if id == self.t304 {
            warn!("T304 expired, handover failed");
            if self.procs.ho_handler.is_running() {
                proc::trigger(self, ho_slot, HandoverEvent::T304Expiry);
            }
            self.start_connection_reest(ReestablishmentCause::HandoverFailure);
            return;
        }
        if id == self.t310 {
            warn!("T310 expired, radio link failure");
            if self.state().is_connected() {
                self.start_connection_reest(ReestablishmentCause::OtherFailure);
            }
            return;
        }
        if id == self.t311 {
            // the reestablishment procedure polls T311
            info!("T311 expired");
            return;
        }
        if let Some(p) = self.procs.si_acquirer.get() {
            if p.owns_timer(id) {
                proc::trigger(self, si_acquirer_slot, SiAcquireEvent::TimerExpired(id));
                return;
            }
        }
        if let Some(p) = self.procs.idle_setter.get() {
            if p.owns_timer(id) {
                proc::trigger(self, idle_setter_slot, true);
                return;
            }
        }
        if let Some(p) = self.procs.cell_reselector.get() {
            if p.owns_timer(id) {
                self.relaunch_cell_reselection();
                return;
            }
        }
        debug!(%id, "expired timer with no owner");
    }

    // ========================================================================
    // Helpers used by the procedures
    // ========================================================================

    /// Cell selection S-criterion (TS 36.304 Section 5.2.3.2): the measured
    /// RSRP must exceed Qrxlevmin, taken from SIB3 when available, falling
    /// back to SIB1 and then the configured default.
    pub(crate) fn cell_selection_criteria(&self, rsrp_dbm: f32) -> bool {
        if !rsrp_dbm.is_finite() {
            return false;
        }
        let serving = self.meas_cells.serving_cell();
        let q_rxlev_min = serving
            .sib3()
            .map(|s| s.q_rxlev_min)
            .or_else(|| serving.sib1().map(|s| s.q_rxlev_min))
            .unwrap_or(self.cfg.q_rxlev_min_dbm);
        rsrp_dbm - q_rxlev_min > 0.0
    }

    /// True when RLC reports SRB1/SRB2 transmit queues drained.
    pub(crate) fn srbs_flushed(&self) -> bool {
        self.rlc.get_metrics().srbs_flushed()
    }

    pub(crate) fn set_phy_default(&mut self) {
        debug!("applying default PHY configuration");
    }

    pub(crate) fn set_phy_default_pucch_srs(&mut self) {
        debug!("applying default PUCCH/SRS configuration");
    }

    pub(crate) fn set_mac_default(&mut self) {
        self.mac.set_default_config();
    }

    pub(crate) fn set_mac_dedicated_default(&mut self) {
        self.mac.set_default_dedicated_config();
    }

    pub(crate) fn apply_rr_config_common(&mut self, _cfg: &RrConfigCommon, send_lower_layers: bool) {
        debug!(send_lower_layers, "applying common radio resource configuration");
        if send_lower_layers {
            self.mac.set_default_config();
        }
    }

    pub(crate) fn apply_rr_config_dedicated(&mut self) {
        debug!("applying dedicated radio resource configuration");
        self.mac.set_default_dedicated_config();
    }

    pub(crate) fn apply_scell_config(&mut self) {
        debug!("applying SCell configuration");
    }

    /// Stores the measurement configuration of a reconfiguration, rewriting
    /// measurement objects that reference the handover source frequency.
    pub(crate) fn parse_meas_config(
        &mut self,
        recfg: &RrcConnectionReconfiguration,
        source_earfcn: u32,
    ) -> bool {
        if let Some(meas_config) = &recfg.meas_config {
            info!(
                objects = meas_config.meas_object_earfcns.len(),
                source_earfcn, "measurement configuration applied"
            );
            self.meas_cfg = Some(meas_config.clone());
        }
        true
    }

    /// Sends an RRCConnectionRequest on SRB0 and enters RRC_CONNECTING.
    pub(crate) fn send_con_request(&mut self, cause: EstablishmentCause) {
        let ue_identity = match self.ue_identity {
            Some(s_tmsi) => s_tmsi.to_u64(),
            // 40-bit random value when no S-TMSI was assigned yet
            None => rand::random::<u64>() & 0xFF_FFFF_FFFF,
        };
        let pdu = uplink::build_connection_request(cause, ue_identity);
        log_rrc_message(Direction::Tx, "RRCConnectionRequest", &pdu);
        info!(%cause, "sending RRCConnectionRequest");
        self.pdcp.write_sdu(LCID_SRB0, pdu, false);
        if let Err(e) = self.state.transition(RrcTransition::ConnectionRequested) {
            warn!(%e, "connection request");
        }
    }

    /// Sends an RRCConnectionReestablishmentRequest on SRB0.
    pub(crate) fn send_con_reest_request(
        &mut self,
        cause: ReestablishmentCause,
        rnti: u16,
        source_pci: u16,
    ) {
        let pdu = uplink::build_reestablishment_request(cause, rnti, source_pci);
        log_rrc_message(Direction::Tx, "RRCConnectionReestablishmentRequest", &pdu);
        info!(%cause, rnti, source_pci, "sending RRCConnectionReestablishmentRequest");
        self.pdcp.write_sdu(LCID_SRB0, pdu, false);
    }

    /// Sends an RRCConnectionReconfigurationComplete on SRB1.
    pub(crate) fn send_reconfig_complete(&mut self, transaction_id: u8) {
        let pdu = uplink::build_reconfiguration_complete(transaction_id);
        log_rrc_message(Direction::Tx, "RRCConnectionReconfigurationComplete", &pdu);
        self.pdcp.write_sdu(LCID_SRB1, pdu, true);
    }

    /// Reconfiguration could not be applied; fall back to reestablishment.
    pub(crate) fn con_reconfig_failed(&mut self) {
        warn!("reconfiguration failed");
        self.start_connection_reest(ReestablishmentCause::ReconfigFailure);
    }

    /// Releases the connection locally: stops the connection timers,
    /// deactivates security, resets the lower layers and resumes paging
    /// reception when still camping.
    pub(crate) fn leave_connected(&mut self) {
        info!("leaving RRC_CONNECTED");
        for id in [self.t300, self.t301, self.t304, self.t310, self.t311] {
            self.timers.stop(id);
        }
        self.security_is_activated = false;
        self.meas_cfg = None;
        self.mac.reset();
        self.rlc.reestablish();
        self.pdcp.reestablish();
        if self.state().is_connected() {
            let _ = self.state.transition(RrcTransition::LeaveConnected);
        }
        if self.phy_ctrl.cell_is_camping() {
            self.mac.pcch_start_rx();
        }
    }
}
