//! Connection establishment scenarios
//!
//! Covers the cold attach ladder, T300 supervision, rejects with barring and
//! the procedure preconditions.

use crate::test_fixtures::{TestBench, TEST_EARFCN, TEST_PCI};
use lteue_common::types::{BarringKind, EstablishmentCause, PhyCell, Plmn};
use lteue_stack::RrcTimer;

#[test]
fn test_cold_attach_no_neighbours() {
    let mut bench = TestBench::new();
    bench.establish_connection();

    assert!(bench.rrc().state().is_connected());
    assert_eq!(
        bench.rrc().meas_cells().serving_cell().phy_cell(),
        PhyCell::new(TEST_EARFCN, TEST_PCI)
    );
    assert!(!bench.rrc().timer_is_running(RrcTimer::T300));

    // the setup complete carried the stored NAS PDU on SRB1
    let pdcp = bench.pdcp_state();
    let (lcid, pdu) = pdcp.sdus.last().expect("setup complete sent");
    assert_eq!(*lcid, 1);
    assert_eq!(pdu[0], 0x02);
    assert!(pdu.ends_with(&[0x07, 0x41]));
}

#[test]
fn test_serving_cell_always_present_through_attach() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    // the startup placeholder was replaced, not removed
    assert_eq!(bench.rrc().meas_cells().serving_cell().pci(), TEST_PCI);
    assert_eq!(bench.rrc().meas_cells().nof_neighbours(), 0);
}

#[test]
fn test_t300_timeout_returns_to_idle() {
    let mut bench = TestBench::new();
    bench.establish_to_request_sent();

    let resets_before = bench.mac_state().resets;
    let rlc_before = bench.rlc.lock().unwrap().reestablishments;

    // no RRCConnectionSetup arrives within T300 (50 ms)
    bench.tick_n(60);

    assert!(bench.rrc().state().is_idle());
    assert!(bench.rrc().procs().conn_req.is_idle());
    assert_eq!(bench.nas_state().connection_results, vec![false]);
    assert!(bench.mac_state().resets > resets_before);
    assert!(bench.mac_state().default_configs > 0);
    assert!(bench.rlc.lock().unwrap().reestablishments > rlc_before);
}

#[test]
fn test_connection_reject_bars_access() {
    let mut bench = TestBench::new();
    bench.establish_to_request_sent();

    bench.rrc_mut().connection_reject(2);
    bench.tick();

    assert!(bench.rrc().state().is_idle());
    assert_eq!(bench.nas_state().connection_results, vec![false]);
    assert!(bench.rrc().timer_is_running(RrcTimer::T302));
    assert!(bench
        .nas_state()
        .barrings
        .contains(&BarringKind::MoData));

    // a retry while T302 runs fails with barring
    assert!(bench
        .rrc_mut()
        .start_connection_request(EstablishmentCause::MoData, None));
    assert_eq!(bench.nas_state().connection_results, vec![false, false]);

    // T302 expiry lifts the barring
    bench.tick_n(2005);
    assert!(!bench.rrc().timer_is_running(RrcTimer::T302));
    assert_eq!(
        bench.nas_state().barrings.last(),
        Some(&BarringKind::None)
    );
}

#[test]
fn test_connection_request_requires_selected_plmn() {
    let mut bench = TestBench::new();
    // no plmn_select() happened
    assert!(bench
        .rrc_mut()
        .start_connection_request(EstablishmentCause::MoData, None));
    assert!(bench.rrc().state().is_idle());
    assert_eq!(bench.nas_state().connection_results, vec![false]);
}

#[test]
fn test_connection_request_busy_while_in_flight() {
    let mut bench = TestBench::new();
    bench.rrc_mut().plmn_select(Plmn::new(1, 1, false));
    assert!(bench
        .rrc_mut()
        .start_connection_request(EstablishmentCause::MoData, None));
    // the first request is waiting for the cell search to complete
    assert!(!bench
        .rrc_mut()
        .start_connection_request(EstablishmentCause::MoSignalling, None));
}

#[test]
fn test_relaunch_after_completion_starts_fresh() {
    let mut bench = TestBench::new();
    bench.establish_connection();

    // release the connection and attach again on the same bench
    bench.rrc_mut().start_go_idle();
    bench.tick_n(5);
    assert!(bench.rrc().state().is_idle());

    assert!(bench
        .rrc_mut()
        .start_connection_request(EstablishmentCause::MoData, None));
}
