//! System information acquisition scenarios
//!
//! SI window computation through the engine (MAC BCCH programming), retry
//! behaviour, the acquisition timeout, and skipping of unscheduled SIBs.

use crate::test_fixtures::{test_config, TestBench, TEST_EARFCN, TEST_PCI};
use lteue_common::types::PhyCell;
use lteue_stack::cell::Cell;
use lteue_stack::messages::{SchedInfo, Sib1};

/// Prepares a camped serving cell carrying the given SIB1.
fn camp_on_cell(bench: &mut TestBench, sib1: Sib1) {
    let cell = PhyCell::new(TEST_EARFCN, TEST_PCI);
    bench.rrc_mut().meas_cells_mut().add_meas_cell(Cell::new(cell));
    bench.rrc_mut().meas_cells_mut().set_serving(cell, true);
    bench
        .rrc_mut()
        .meas_cells_mut()
        .serving_cell_mut()
        .set_sib1(sib1);
    bench.set_link(true, true);
}

#[test]
fn test_sib3_window_scheduled_at_third_entry() {
    let mut bench = TestBench::new();
    // SIB3 rides the third SI message with T=16 and si-WindowLength 10:
    // x = 2 * 10 = 20, frame offset 2, subframe 0
    let sib1 = Sib1 {
        si_win_len: 10,
        sched_info_list: vec![
            SchedInfo {
                si_periodicity: 8,
                sib_map_info: vec![],
            },
            SchedInfo {
                si_periodicity: 16,
                sib_map_info: vec![4],
            },
            SchedInfo {
                si_periodicity: 16,
                sib_map_info: vec![3],
            },
        ],
        ..bench.default_sib1()
    };
    camp_on_cell(&mut bench, sib1);
    bench.rrc_mut().meas_cells_mut().serving_cell_mut().set_sib(1);

    // at TTI 0 the next window of the third SI message starts at TTI 180
    assert!(bench.rrc_mut().start_serving_cell_config(vec![2]));
    assert_eq!(bench.mac_state().bcch_rx, vec![(180, 10)]);
}

#[test]
fn test_si_acquisition_retries_until_delivery() {
    let mut bench = TestBench::new();
    let sib1 = bench.default_sib1();
    camp_on_cell(&mut bench, sib1);

    assert!(bench.rrc_mut().start_serving_cell_config(vec![1]));
    assert_eq!(bench.mac_state().bcch_rx.len(), 1);

    // retry period is si-Periodicity * 5 radio frames past the window start
    bench.tick_n(260);
    assert!(bench.mac_state().bcch_rx.len() >= 2);

    bench.deliver_sib2();
    bench.tick();
    assert!(bench.rrc().procs().serv_cell_cfg.is_idle());
    assert!(bench.rrc().meas_cells().serving_cell().has_sib2());
}

#[test]
fn test_si_acquisition_timeout_fails_configuration() {
    let mut bench = TestBench::with_config({
        let mut cfg = test_config();
        cfg.sib_search_timeout_ms = 120;
        cfg
    });
    let sib1 = bench.default_sib1();
    camp_on_cell(&mut bench, sib1);

    assert!(bench.rrc_mut().start_serving_cell_config(vec![1]));
    let future = bench.rrc().procs().serv_cell_cfg.get_future();

    // never deliver SIB2; the acquisition timeout aborts the procedure and
    // a missing SIB2 is fatal for the configuration
    bench.tick_n(130);
    assert!(future.is_error());
    assert!(bench.rrc().procs().si_acquirer.is_idle());
}

#[test]
fn test_unscheduled_optional_sib_is_skipped() {
    let mut bench = TestBench::new();
    let sib1 = bench.default_sib1();
    camp_on_cell(&mut bench, sib1);

    // SIB4 (index 3) is not in the scheduling list: skipped, not fatal
    assert!(bench.rrc_mut().start_serving_cell_config(vec![3]));
    let future = bench.rrc().procs().serv_cell_cfg.get_future();
    assert!(future.is_success());
    assert!(bench.mac_state().bcch_rx.is_empty());
}

#[test]
fn test_configuration_requires_camping() {
    let mut bench = TestBench::new();
    let sib1 = bench.default_sib1();
    camp_on_cell(&mut bench, sib1);
    bench.set_link(false, false);

    assert!(bench.rrc_mut().start_serving_cell_config(vec![0]));
    let future = bench.rrc().procs().serv_cell_cfg.get_future();
    assert!(future.is_error());
}

#[test]
fn test_sib_reset_then_sib1_roundtrip() {
    let mut bench = TestBench::new();
    let sib1 = bench.default_sib1();
    camp_on_cell(&mut bench, sib1);
    bench.rrc_mut().meas_cells_mut().serving_cell_mut().set_sib(1);
    bench.rrc_mut().meas_cells_mut().serving_cell_mut().set_sib(2);

    bench
        .rrc_mut()
        .meas_cells_mut()
        .serving_cell_mut()
        .reset_sibs();
    bench.deliver_sib1();

    let serving = bench.rrc().meas_cells().serving_cell();
    assert!(serving.has_sib1());
    for sib_index in 1..13 {
        assert!(!serving.has_sib(sib_index));
    }
}
