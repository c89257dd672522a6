//! Test fixtures and recording mock collaborators
//!
//! The mocks record every downward call made by the engine behind shared
//! state handles, so scenarios can assert the exact command sequences the
//! procedures issued. The [`TestBench`] wires a [`lteue_stack::UeStack`]
//! around them and offers helpers that play the radio and network roles.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use lteue_common::config::UeConfig;
use lteue_common::error::Error;
use lteue_common::types::{
    BarringKind, EstablishmentCause, FoundPlmn, PhyCell, Plmn, Rnti, STmsi,
};
use lteue_stack::interfaces::{
    CellSearchOutcome, CellSearchResult, GwInterface, LastFreq, MacInterface, NasInterface,
    PdcpInterface, PdnType, PhyInterface, RlcBearerMetrics, RlcInterface, RlcMetrics,
    SecurityContext, UeRntis, UsimInterface,
};
use lteue_stack::messages::{SchedInfo, Sib1, Sib2, Sib3, SibMessage, UeTimersAndConstants};
use lteue_stack::rrc::Rrc;
use lteue_stack::stack::UeStack;

/// Default test cell.
pub const TEST_EARFCN: u32 = 6400;
pub const TEST_PCI: u16 = 1;
pub const TEST_RSRP_DBM: f32 = -80.0;

/// Configuration with short timers so scenarios run in few hundred TTIs.
pub fn test_config() -> UeConfig {
    UeConfig {
        plmn: Plmn::new(1, 1, false),
        required_sibs: vec![0, 1, 2],
        max_neighbours: 8,
        cell_reselection_period_ms: 100,
        rlc_flush_timeout_ms: 10,
        sib_search_timeout_ms: 10_240,
        t300_ms: 50,
        t301_ms: 50,
        t310_ms: 20,
        t311_ms: 100,
        q_rxlev_min_dbm: -140.0,
        log_level: "warn".to_string(),
    }
}

// ============================================================================
// Recording mocks
// ============================================================================

#[derive(Debug, Default)]
pub struct MockPhyState {
    pub reject_requests: bool,
    pub in_sync: bool,
    pub camping: bool,
    pub pending_searches: u32,
    pub pending_selects: Vec<PhyCell>,
    pub resets: u32,
}

pub struct MockPhy(pub Arc<Mutex<MockPhyState>>);

impl PhyInterface for MockPhy {
    fn start_cell_search(&mut self) -> bool {
        let mut state = self.0.lock().unwrap();
        if state.reject_requests {
            return false;
        }
        state.pending_searches += 1;
        true
    }
    fn start_cell_select(&mut self, cell: PhyCell) -> bool {
        let mut state = self.0.lock().unwrap();
        if state.reject_requests {
            return false;
        }
        state.pending_selects.push(cell);
        true
    }
    fn is_in_sync(&self) -> bool {
        self.0.lock().unwrap().in_sync
    }
    fn cell_is_camping(&self) -> bool {
        self.0.lock().unwrap().camping
    }
    fn reset(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.resets += 1;
        state.in_sync = false;
        state.camping = false;
    }
}

#[derive(Debug, Default)]
pub struct MockMacState {
    pub crnti: Rnti,
    pub bcch_rx: Vec<(u32, u32)>,
    pub pcch_starts: u32,
    pub resets: u32,
    pub rnti_clears: u32,
    pub ho_rnti: Option<(Rnti, u16)>,
    pub cont_ho_starts: u32,
    pub noncont_ho_starts: Vec<(u8, u8)>,
    pub wait_uplinks: u32,
    pub default_configs: u32,
    pub dedicated_default_configs: u32,
    pub ttis: u32,
}

pub struct MockMac(pub Arc<Mutex<MockMacState>>);

impl MacInterface for MockMac {
    fn run_tti(&mut self, _tti: u32) {
        self.0.lock().unwrap().ttis += 1;
    }
    fn bcch_start_rx(&mut self, si_win_start_tti: u32, si_win_len: u32) {
        self.0
            .lock()
            .unwrap()
            .bcch_rx
            .push((si_win_start_tti, si_win_len));
    }
    fn pcch_start_rx(&mut self) {
        self.0.lock().unwrap().pcch_starts += 1;
    }
    fn reset(&mut self) {
        self.0.lock().unwrap().resets += 1;
    }
    fn clear_rntis(&mut self) {
        self.0.lock().unwrap().rnti_clears += 1;
    }
    fn set_ho_rnti(&mut self, rnti: Rnti, pci: u16) {
        self.0.lock().unwrap().ho_rnti = Some((rnti, pci));
    }
    fn start_cont_ho(&mut self) {
        self.0.lock().unwrap().cont_ho_starts += 1;
    }
    fn start_noncont_ho(&mut self, preamble_index: u8, prach_mask_index: u8) {
        self.0
            .lock()
            .unwrap()
            .noncont_ho_starts
            .push((preamble_index, prach_mask_index));
    }
    fn wait_uplink(&mut self) {
        self.0.lock().unwrap().wait_uplinks += 1;
    }
    fn get_rntis(&self) -> UeRntis {
        UeRntis {
            crnti: self.0.lock().unwrap().crnti,
        }
    }
    fn set_default_config(&mut self) {
        self.0.lock().unwrap().default_configs += 1;
    }
    fn set_default_dedicated_config(&mut self) {
        self.0.lock().unwrap().dedicated_default_configs += 1;
    }
}

#[derive(Debug, Default)]
pub struct MockRlcState {
    pub bearers: Vec<u32>,
    pub srb_queued_bytes: u32,
    pub reestablishments: u32,
    pub suspended: Vec<u32>,
    pub stops: u32,
}

pub struct MockRlc(pub Arc<Mutex<MockRlcState>>);

impl RlcInterface for MockRlc {
    fn reestablish(&mut self) {
        self.0.lock().unwrap().reestablishments += 1;
    }
    fn suspend_bearer(&mut self, lcid: u32) {
        self.0.lock().unwrap().suspended.push(lcid);
    }
    fn has_bearer(&self, lcid: u32) -> bool {
        self.0.lock().unwrap().bearers.contains(&lcid)
    }
    fn stop(&mut self) {
        self.0.lock().unwrap().stops += 1;
    }
    fn get_metrics(&self) -> RlcMetrics {
        let state = self.0.lock().unwrap();
        RlcMetrics {
            bearers: vec![
                RlcBearerMetrics {
                    lcid: 1,
                    tx_queued_bytes: state.srb_queued_bytes,
                },
                RlcBearerMetrics {
                    lcid: 2,
                    tx_queued_bytes: 0,
                },
            ],
        }
    }
}

#[derive(Debug, Default)]
pub struct MockPdcpState {
    pub reestablishments: u32,
    pub security_configs: Vec<SecurityContext>,
    pub sdus: Vec<(u32, Vec<u8>)>,
}

pub struct MockPdcp(pub Arc<Mutex<MockPdcpState>>);

impl PdcpInterface for MockPdcp {
    fn reestablish(&mut self) {
        self.0.lock().unwrap().reestablishments += 1;
    }
    fn config_security_all(&mut self, sec: &SecurityContext) {
        self.0.lock().unwrap().security_configs.push(sec.clone());
    }
    fn write_sdu(&mut self, lcid: u32, pdu: Bytes, _blocking: bool) {
        self.0.lock().unwrap().sdus.push((lcid, pdu.to_vec()));
    }
}

#[derive(Debug)]
pub struct MockNasState {
    pub attached: bool,
    pub accept_paging: bool,
    pub plmn_results: Vec<(Vec<FoundPlmn>, i32)>,
    pub connection_results: Vec<bool>,
    pub pagings: Vec<STmsi>,
    pub barrings: Vec<BarringKind>,
}

impl Default for MockNasState {
    fn default() -> Self {
        Self {
            attached: true,
            accept_paging: true,
            plmn_results: Vec::new(),
            connection_results: Vec::new(),
            pagings: Vec::new(),
            barrings: Vec::new(),
        }
    }
}

pub struct MockNas(pub Arc<Mutex<MockNasState>>);

impl NasInterface for MockNas {
    fn plmn_search_completed(&mut self, found: &[FoundPlmn], nof_plmns: i32) {
        self.0
            .lock()
            .unwrap()
            .plmn_results
            .push((found.to_vec(), nof_plmns));
    }
    fn connection_request_completed(&mut self, ok: bool) {
        self.0.lock().unwrap().connection_results.push(ok);
    }
    fn paging(&mut self, s_tmsi: &STmsi) -> bool {
        let mut state = self.0.lock().unwrap();
        state.pagings.push(*s_tmsi);
        state.accept_paging
    }
    fn set_barring(&mut self, kind: BarringKind) {
        self.0.lock().unwrap().barrings.push(kind);
    }
    fn is_attached(&self) -> bool {
        self.0.lock().unwrap().attached
    }
}

#[derive(Debug, Default)]
pub struct MockUsimState {
    pub derivations: Vec<(u16, u32, Option<u8>)>,
}

pub struct MockUsim(pub Arc<Mutex<MockUsimState>>);

impl UsimInterface for MockUsim {
    fn generate_as_keys_ho(
        &mut self,
        target_pci: u16,
        earfcn: u32,
        ncc: Option<u8>,
        sec: &mut SecurityContext,
    ) {
        self.0
            .lock()
            .unwrap()
            .derivations
            .push((target_pci, earfcn, ncc));
        sec.k_rrc_enc = [0xA5; 32];
        sec.k_rrc_int = [0x5A; 32];
        sec.k_up_enc = [0xC3; 32];
        sec.ncc = ncc;
    }
}

#[derive(Debug, Default)]
pub struct MockGwState {
    pub setups: Vec<u32>,
}

pub struct MockGw(pub Arc<Mutex<MockGwState>>);

impl GwInterface for MockGw {
    fn setup_if_addr(
        &mut self,
        lcid: u32,
        _pdn_type: PdnType,
        _ipv4: Option<Ipv4Addr>,
        _ipv6: Option<Ipv6Addr>,
    ) -> Result<(), Error> {
        self.0.lock().unwrap().setups.push(lcid);
        Ok(())
    }
}

// ============================================================================
// Test bench
// ============================================================================

/// UE stack wired to recording mocks, driven TTI by TTI from the test.
pub struct TestBench {
    pub stack: UeStack,
    pub tti: u32,
    pub phy: Arc<Mutex<MockPhyState>>,
    pub mac: Arc<Mutex<MockMacState>>,
    pub rlc: Arc<Mutex<MockRlcState>>,
    pub pdcp: Arc<Mutex<MockPdcpState>>,
    pub nas: Arc<Mutex<MockNasState>>,
    pub usim: Arc<Mutex<MockUsimState>>,
    pub gw: Arc<Mutex<MockGwState>>,
}

impl TestBench {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(cfg: UeConfig) -> Self {
        let phy = Arc::new(Mutex::new(MockPhyState::default()));
        let mac = Arc::new(Mutex::new(MockMacState {
            crnti: 0x4601,
            ..Default::default()
        }));
        let rlc = Arc::new(Mutex::new(MockRlcState {
            bearers: vec![1, 2],
            ..Default::default()
        }));
        let pdcp = Arc::new(Mutex::new(MockPdcpState::default()));
        let nas = Arc::new(Mutex::new(MockNasState::default()));
        let usim = Arc::new(Mutex::new(MockUsimState::default()));
        let gw = Arc::new(Mutex::new(MockGwState::default()));

        let stack = UeStack::new(
            cfg,
            Box::new(MockPhy(Arc::clone(&phy))),
            Box::new(MockMac(Arc::clone(&mac))),
            Box::new(MockRlc(Arc::clone(&rlc))),
            Box::new(MockPdcp(Arc::clone(&pdcp))),
            Box::new(MockNas(Arc::clone(&nas))),
            Box::new(MockUsim(Arc::clone(&usim))),
            Box::new(MockGw(Arc::clone(&gw))),
        )
        .expect("stack construction");

        Self {
            stack,
            tti: 0,
            phy,
            mac,
            rlc,
            pdcp,
            nas,
            usim,
            gw,
        }
    }

    pub fn rrc(&self) -> &Rrc {
        self.stack.rrc()
    }

    pub fn rrc_mut(&mut self) -> &mut Rrc {
        self.stack.rrc_mut()
    }

    /// Runs one scheduler turn.
    pub fn tick(&mut self) {
        self.tti += 1;
        self.stack.run_tti_direct(self.tti);
    }

    /// Runs `n` scheduler turns.
    pub fn tick_n(&mut self, n: u32) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Updates the radio link state reported by the PHY mock.
    pub fn set_link(&self, in_sync: bool, camping: bool) {
        let mut phy = self.phy.lock().unwrap();
        phy.in_sync = in_sync;
        phy.camping = camping;
    }

    /// Consumes one pending cell search request, if any.
    pub fn take_search_request(&self) -> bool {
        let mut phy = self.phy.lock().unwrap();
        if phy.pending_searches > 0 {
            phy.pending_searches -= 1;
            true
        } else {
            false
        }
    }

    /// Consumes one pending cell select request, if any.
    pub fn take_select_request(&self) -> Option<PhyCell> {
        let mut phy = self.phy.lock().unwrap();
        if phy.pending_selects.is_empty() {
            None
        } else {
            Some(phy.pending_selects.remove(0))
        }
    }

    pub fn mac_state(&self) -> MutexGuard<'_, MockMacState> {
        self.mac.lock().unwrap()
    }

    pub fn nas_state(&self) -> MutexGuard<'_, MockNasState> {
        self.nas.lock().unwrap()
    }

    pub fn pdcp_state(&self) -> MutexGuard<'_, MockPdcpState> {
        self.pdcp.lock().unwrap()
    }

    /// SIB1 of the test cell: SIB2 rides the first SI message, SIB3 the
    /// second.
    pub fn default_sib1(&self) -> Sib1 {
        Sib1 {
            cell_id: 0x1A2D0,
            plmns: vec![Plmn::new(1, 1, false)],
            tac: 0x1234,
            q_rxlev_min: -140.0,
            si_win_len: 10,
            sched_info_list: vec![
                SchedInfo {
                    si_periodicity: 16,
                    sib_map_info: vec![],
                },
                SchedInfo {
                    si_periodicity: 16,
                    sib_map_info: vec![3],
                },
            ],
        }
    }

    pub fn deliver_sib1(&mut self) {
        let sib1 = self.default_sib1();
        self.rrc_mut().handle_sib(SibMessage::Sib1(sib1));
    }

    /// SIB2 carrying the same short timers as the test configuration.
    pub fn deliver_sib2(&mut self) {
        let sib2 = Sib2 {
            ue_timers: UeTimersAndConstants {
                t300_ms: 50,
                t301_ms: 50,
                t310_ms: 20,
                t311_ms: 100,
                n310: 1,
                n311: 1,
            },
        };
        self.rrc_mut().handle_sib(SibMessage::Sib2(sib2));
    }

    pub fn deliver_sib3(&mut self) {
        self.rrc_mut().handle_sib(SibMessage::Sib3(Sib3::default()));
    }

    /// Answers one pending search with "cell found" on the test cell.
    pub fn answer_search_cell_found(&mut self) {
        assert!(self.take_search_request(), "no pending cell search");
        self.rrc_mut().cell_search_completed(CellSearchResult {
            found: CellSearchOutcome::CellFound,
            last_freq: LastFreq::NoMoreFreqs,
            found_cell: Some(PhyCell::new(TEST_EARFCN, TEST_PCI)),
        });
    }

    /// Answers one pending search with "no cell, no more frequencies".
    pub fn answer_search_no_cell(&mut self) {
        assert!(self.take_search_request(), "no pending cell search");
        self.rrc_mut().cell_search_completed(CellSearchResult {
            found: CellSearchOutcome::CellNotFound,
            last_freq: LastFreq::NoMoreFreqs,
            found_cell: None,
        });
    }

    /// Answers one pending select, optionally camping on success.
    pub fn answer_select(&mut self, cs_ret: bool) {
        assert!(
            self.take_select_request().is_some(),
            "no pending cell select"
        );
        if cs_ret {
            self.set_link(true, true);
        }
        self.rrc_mut().cell_select_completed(cs_ret);
    }

    /// Walks the UE from idle with an empty cell list to the point where the
    /// RRCConnectionRequest has been sent and T300 runs: search, select, SIB
    /// acquisition (with one retry for SIB1) and the request itself.
    pub fn establish_to_request_sent(&mut self) {
        self.rrc_mut().plmn_select(Plmn::new(1, 1, false));
        assert!(self
            .rrc_mut()
            .start_connection_request(EstablishmentCause::MoData, Some(Bytes::from_static(&[0x07, 0x41]))));

        // connection request launched cell selection, which found no usable
        // cell and fell back to a cell search
        self.answer_search_cell_found();
        self.answer_select(true);
        self.rrc_mut().new_cell_meas(TEST_EARFCN, TEST_PCI, TEST_RSRP_DBM);

        // first measurement triggers the SIB1 acquisition
        self.tick();
        assert_eq!(self.mac_state().bcch_rx.len(), 1, "SIB1 window scheduled");

        // let the retry fire once before delivering SIB1
        self.tick_n(60);
        assert!(
            self.mac_state().bcch_rx.len() >= 2,
            "SIB1 retry window scheduled"
        );
        self.deliver_sib1();

        // serving cell configuration fetches SIB2 then SIB3
        self.tick();
        self.deliver_sib2();
        self.tick();
        self.deliver_sib3();
        self.tick();

        assert!(self.rrc().state().is_connecting(), "request sent");
        assert!(self.rrc().timer_is_running(lteue_stack::RrcTimer::T300));
        {
            let pdcp = self.pdcp_state();
            let (lcid, pdu) = pdcp.sdus.first().expect("connection request sent");
            assert_eq!(*lcid, 0);
            assert_eq!(pdu[0], 0x01);
        }
    }

    /// Walks the UE all the way to RRC_CONNECTED on the test cell.
    pub fn establish_connection(&mut self) {
        self.establish_to_request_sent();
        self.rrc_mut().connection_setup();
        assert!(self.rrc().state().is_connected());
        self.tick();
        assert_eq!(self.nas_state().connection_results, vec![true]);
        assert!(self.rrc().procs().conn_req.is_idle());
    }
}

impl Default for TestBench {
    fn default() -> Self {
        Self::new()
    }
}
