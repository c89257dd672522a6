//! Mobility scenarios
//!
//! Intra-LTE handover (success, unknown target, selection failure, security
//! validation) and connection reestablishment (request sent, aborted by
//! T311, not attempted without security, radio link failure via T310).

use crate::test_fixtures::{TestBench, TEST_EARFCN};
use lteue_common::types::{PhyCell, ReestablishmentCause};
use lteue_stack::interfaces::SecurityContext;
use lteue_stack::messages::{
    MeasConfig, MobilityControlInfo, RachConfigDedicated, RrcConnectionReconfiguration,
    SecurityConfigHo,
};
use lteue_stack::{ReestOutcome, RrcTimer};

/// Handover target used by the scenarios.
const TARGET_PCI: u16 = 2;

fn ho_reconfig(
    rach_cfg_ded: Option<RachConfigDedicated>,
    security_cfg_ho: Option<SecurityConfigHo>,
) -> RrcConnectionReconfiguration {
    RrcConnectionReconfiguration {
        transaction_id: 2,
        mobility_control_info: Some(MobilityControlInfo {
            target_pci: TARGET_PCI,
            carrier_freq: None,
            new_ue_id: 0x4602,
            t304_ms: 100,
            rach_cfg_ded,
            rr_cfg_common: Default::default(),
        }),
        rr_cfg_ded_present: false,
        scell_config_present: false,
        security_cfg_ho,
        meas_config: Some(MeasConfig {
            meas_object_earfcns: vec![TEST_EARFCN],
            report_amount: 8,
        }),
    }
}

fn connected_with_neighbour(bench: &mut TestBench) {
    bench.establish_connection();
    bench.rrc_mut().apply_security_config(SecurityContext::default());
    bench.rrc_mut().new_cell_meas(TEST_EARFCN, TARGET_PCI, -85.0);
    assert_eq!(bench.rrc().meas_cells().nof_neighbours(), 1);
}

#[test]
fn test_intra_lte_handover_success() {
    let mut bench = TestBench::new();
    connected_with_neighbour(&mut bench);

    let security_cfg_ho = SecurityConfigHo {
        key_change_ind: false,
        next_hop_chaining_count: 2,
        algorithms: None,
    };
    bench
        .rrc_mut()
        .handle_reconfiguration(ho_reconfig(None, Some(security_cfg_ho)));

    assert!(bench.rrc().timer_is_running(RrcTimer::T304));
    assert!(bench.rrc().procs().ho_handler.is_running());

    // one turn performs the stack reset and launches the target selection
    bench.tick();
    {
        let mac = bench.mac_state();
        assert_eq!(mac.ho_rnti, Some((0x4602, TARGET_PCI)));
        assert_eq!(mac.wait_uplinks, 1);
        assert_eq!(mac.rnti_clears, 1);
    }
    assert_eq!(bench.phy.lock().unwrap().resets, 1);
    assert_eq!(
        bench.take_select_request(),
        Some(PhyCell::new(TEST_EARFCN, TARGET_PCI))
    );

    bench.set_link(true, true);
    bench.rrc_mut().cell_select_completed(true);

    // target promoted to serving, contention RA, keys rederived
    assert_eq!(bench.rrc().meas_cells().serving_cell().pci(), TARGET_PCI);
    assert_eq!(bench.mac_state().cont_ho_starts, 1);
    assert_eq!(
        bench.usim.lock().unwrap().derivations,
        vec![(TARGET_PCI, TEST_EARFCN, Some(2))]
    );
    assert_eq!(bench.pdcp_state().security_configs.len(), 1);
    {
        let pdcp = bench.pdcp_state();
        let (lcid, pdu) = pdcp.sdus.last().expect("reconfiguration complete queued");
        assert_eq!(*lcid, 1);
        assert_eq!(pdu[0], 0x04);
    }

    bench.rrc_mut().ra_completed(true);
    assert!(bench.rrc().procs().ho_handler.is_idle());
    assert!(!bench.rrc().timer_is_running(RrcTimer::T304));
    assert!(bench.rrc().state().is_connected());
    // the measurement configuration of the reconfiguration was applied
    assert_eq!(
        bench.rrc().meas_config().map(|m| m.meas_object_earfcns.clone()),
        Some(vec![TEST_EARFCN])
    );
}

#[test]
fn test_handover_with_dedicated_rach() {
    let mut bench = TestBench::new();
    connected_with_neighbour(&mut bench);

    let rach = RachConfigDedicated {
        ra_preamble_index: 5,
        ra_prach_mask_index: 1,
    };
    bench
        .rrc_mut()
        .handle_reconfiguration(ho_reconfig(Some(rach), None));
    bench.tick();
    bench.set_link(true, true);
    bench.rrc_mut().cell_select_completed(true);

    assert_eq!(bench.mac_state().noncont_ho_starts, vec![(5, 1)]);
    assert_eq!(bench.mac_state().cont_ho_starts, 0);
}

#[test]
fn test_handover_to_unknown_target_starts_reestablishment() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    bench.rrc_mut().apply_security_config(SecurityContext::default());
    // no neighbour for the target PCI

    bench.rrc_mut().handle_reconfiguration(ho_reconfig(None, None));

    assert!(bench.rrc().procs().ho_handler.is_idle());
    // con_reconfig_failed fell back to reestablishment
    assert!(bench.rrc().procs().conn_reest.is_running());
    assert!(bench.rrc().timer_is_running(RrcTimer::T311));
    assert!(bench.rlc.lock().unwrap().suspended.contains(&1));
}

#[test]
fn test_handover_select_failure_waits_for_t304() {
    let mut bench = TestBench::new();
    connected_with_neighbour(&mut bench);

    bench.rrc_mut().handle_reconfiguration(ho_reconfig(None, None));
    bench.tick();
    assert!(bench.take_select_request().is_some());

    bench.rrc_mut().cell_select_completed(false);

    // the handover failed but T304 keeps running to drive the recovery
    assert!(bench.rrc().procs().ho_handler.is_idle());
    assert!(bench.rrc().timer_is_running(RrcTimer::T304));
    let target_rsrp = bench
        .rrc()
        .meas_cells()
        .get_neighbour(TEST_EARFCN, TARGET_PCI)
        .expect("target still known")
        .rsrp();
    assert_eq!(target_rsrp, f32::NEG_INFINITY);

    // T304 expiry starts the reestablishment
    bench.tick_n(110);
    assert!(bench.rrc().timer_is_running(RrcTimer::T311));
}

#[test]
fn test_handover_key_change_rejected() {
    let mut bench = TestBench::new();
    connected_with_neighbour(&mut bench);

    let security_cfg_ho = SecurityConfigHo {
        key_change_ind: true,
        next_hop_chaining_count: 1,
        algorithms: None,
    };
    bench
        .rrc_mut()
        .handle_reconfiguration(ho_reconfig(None, Some(security_cfg_ho)));
    bench.tick();
    bench.set_link(true, true);
    bench.rrc_mut().cell_select_completed(true);

    assert!(bench.rrc().procs().ho_handler.is_idle());
    // no keys were derived for the rejected configuration
    assert!(bench.usim.lock().unwrap().derivations.is_empty());
    assert!(bench.rrc().timer_is_running(RrcTimer::T304));
}

#[test]
fn test_reestablishment_not_attempted_without_security() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    // AS security was never activated

    bench
        .rrc_mut()
        .start_connection_reest(ReestablishmentCause::OtherFailure);
    let future = bench.rrc().procs().conn_reest.get_future();
    assert_eq!(future.value(), Some(ReestOutcome::NotAttempted));
    assert!(bench.rrc().procs().idle_setter.is_running());

    bench.tick_n(5);
    assert!(bench.rrc().state().is_idle());
}

#[test]
fn test_reestablishment_aborted_by_t311() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    bench.rrc_mut().apply_security_config(SecurityContext::default());
    bench.set_link(false, false);

    bench
        .rrc_mut()
        .start_connection_reest(ReestablishmentCause::HandoverFailure);
    let future = bench.rrc().procs().conn_reest.get_future();

    assert!(bench.rrc().timer_is_running(RrcTimer::T311));
    assert!(!bench.rrc().timer_is_running(RrcTimer::T310));
    {
        let rlc = bench.rlc.lock().unwrap();
        assert!(rlc.suspended.contains(&1) && rlc.suspended.contains(&2));
    }

    // no suitable cell ever appears: answer every selection attempt with a
    // failure and every search with "no cell" until T311 expires
    let mut guard = 0;
    while bench.rrc().procs().conn_reest.is_running() {
        bench.tick();
        if bench.take_select_request().is_some() {
            bench.rrc_mut().cell_select_completed(false);
        }
        if bench.take_search_request() {
            bench.rrc_mut().cell_search_completed(
                lteue_stack::interfaces::CellSearchResult {
                    found: lteue_stack::interfaces::CellSearchOutcome::CellNotFound,
                    last_freq: lteue_stack::interfaces::LastFreq::NoMoreFreqs,
                    found_cell: None,
                },
            );
        }
        guard += 1;
        assert!(guard < 2000, "reestablishment did not terminate");
    }

    assert_eq!(future.value(), Some(ReestOutcome::Aborted));
    assert!(bench.rrc().procs().idle_setter.is_running() || bench.rrc().state().is_idle());

    bench.tick_n(5);
    assert!(bench.rrc().state().is_idle());
}

#[test]
fn test_reestablishment_request_sent_when_cell_suitable() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    bench.rrc_mut().apply_security_config(SecurityContext::default());
    // serving cell stays in-sync, camping and above the threshold

    bench
        .rrc_mut()
        .start_connection_reest(ReestablishmentCause::ReconfigFailure);
    let future = bench.rrc().procs().conn_reest.get_future();

    let mut guard = 0;
    while bench.rrc().procs().conn_reest.is_running() {
        bench.tick();
        guard += 1;
        assert!(guard < 100, "reestablishment did not terminate");
    }

    assert_eq!(future.value(), Some(ReestOutcome::RequestSent));
    assert!(!bench.rrc().timer_is_running(RrcTimer::T311));
    assert!(bench.rrc().timer_is_running(RrcTimer::T301));
    let pdcp = bench.pdcp_state();
    let (lcid, pdu) = pdcp.sdus.last().expect("reestablishment request sent");
    assert_eq!(*lcid, 0);
    assert_eq!(pdu[0], 0x03);
    assert_eq!(u16::from_be_bytes([pdu[1], pdu[2]]), 0x4601);
}

#[test]
fn test_t310_radio_link_failure_starts_reestablishment() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    bench.rrc_mut().apply_security_config(SecurityContext::default());

    bench.rrc_mut().out_of_sync();
    assert!(bench.rrc().timer_is_running(RrcTimer::T310));

    // T310 is 20 ms in the test configuration; on expiry the
    // reestablishment runs and, with the cell still suitable, sends its
    // request immediately
    bench.tick_n(25);
    assert!(bench.rrc().timer_is_running(RrcTimer::T301));
    let pdcp = bench.pdcp_state();
    let (lcid, pdu) = pdcp.sdus.last().expect("reestablishment request sent");
    assert_eq!(*lcid, 0);
    assert_eq!(pdu[0], 0x03);
}

#[test]
fn test_in_sync_stops_t310() {
    let mut bench = TestBench::new();
    bench.establish_connection();

    bench.rrc_mut().out_of_sync();
    assert!(bench.rrc().timer_is_running(RrcTimer::T310));
    bench.rrc_mut().in_sync();
    assert!(!bench.rrc().timer_is_running(RrcTimer::T310));
}
