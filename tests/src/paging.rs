//! Paging scenarios
//!
//! PCCH processing: S-TMSI matching against the UE identity, NAS paging
//! hand-off, and the system information modification path.

use crate::test_fixtures::TestBench;
use lteue_common::types::STmsi;
use lteue_stack::messages::{Paging, PagingRecord};

fn paging_for(s_tmsi: STmsi, sys_info_mod: bool) -> Paging {
    Paging {
        paging_records: vec![PagingRecord { s_tmsi }],
        sys_info_mod,
    }
}

#[test]
fn test_paging_match_invokes_nas() {
    let mut bench = TestBench::new();
    let identity = STmsi::new(1, 2);
    bench.rrc_mut().set_ue_identity(identity);

    bench.rrc_mut().paging(paging_for(identity, false));
    assert_eq!(bench.nas_state().pagings, vec![identity]);
    assert!(bench.rrc().procs().pcch_processor.is_running());

    bench.rrc_mut().paging_complete(true);
    assert!(bench.rrc().procs().pcch_processor.is_idle());
    // the record was serviced exactly once
    assert_eq!(bench.nas_state().pagings.len(), 1);
}

#[test]
fn test_paging_for_unknown_identity_ignored() {
    let mut bench = TestBench::new();
    bench.rrc_mut().set_ue_identity(STmsi::new(1, 2));

    bench.rrc_mut().paging(paging_for(STmsi::new(3, 4), false));
    assert!(bench.nas_state().pagings.is_empty());
    assert!(bench.rrc().procs().pcch_processor.is_idle());
}

#[test]
fn test_paging_failure_aborts_procedure() {
    let mut bench = TestBench::new();
    let identity = STmsi::new(1, 2);
    bench.rrc_mut().set_ue_identity(identity);

    bench.rrc_mut().paging(paging_for(identity, false));
    bench.rrc_mut().paging_complete(false);

    assert!(bench.rrc().procs().pcch_processor.is_idle());
    assert_eq!(bench.nas_state().pagings.len(), 1);
}

#[test]
fn test_paging_while_connected_is_skipped() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    let identity = STmsi::new(1, 2);
    bench.rrc_mut().set_ue_identity(identity);

    bench.rrc_mut().paging(paging_for(identity, false));
    // the matching record is not serviced outside IDLE
    assert!(bench.nas_state().pagings.is_empty());
    assert!(bench.rrc().procs().pcch_processor.is_idle());
}

#[test]
fn test_sys_info_mod_refreshes_all_sibs() {
    let mut bench = TestBench::new();
    bench.establish_connection();
    assert!(bench.rrc().meas_cells().serving_cell().has_sib3());

    let windows_before = bench.mac_state().bcch_rx.len();
    bench.rrc_mut().paging(Paging {
        paging_records: vec![],
        sys_info_mod: true,
    });

    // SIBs were invalidated and SIB1 acquisition restarted
    assert!(!bench.rrc().meas_cells().serving_cell().has_sib1());
    assert!(bench.mac_state().bcch_rx.len() > windows_before);
    assert!(bench.rrc().procs().pcch_processor.is_running());

    // deliver the refreshed system information
    bench.deliver_sib1();
    bench.tick();
    bench.deliver_sib2();
    bench.tick();
    bench.deliver_sib3();
    bench.tick();

    assert!(bench.rrc().procs().pcch_processor.is_idle());
    let serving = bench.rrc().meas_cells().serving_cell();
    assert!(serving.has_sib1() && serving.has_sib2() && serving.has_sib3());
}
