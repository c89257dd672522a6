//! System information scheduling
//!
//! Deterministic SI-window computation per TS 36.331 Section 5.2.3: given the
//! current TTI, the SIB index of interest and the decoded SIB1, derive the
//! next SI window `(start_tti, length)` for the MAC BCCH receiver.

use crate::messages::Sib1;

/// SIB1 periodicity in radio frames.
pub const SIB1_PERIODICITY: u32 = 20;

/// Determines the start TTI of the next SI window.
///
/// `t` is the si-Periodicity in radio frames, `offset` the frame offset of
/// the window and `a` the subframe in which it starts. The result wraps at
/// the 10240 ms SFN cycle.
pub fn sib_start_tti(tti: u32, t: u32, offset: u32, a: u32) -> u32 {
    // the "1 +" selects the next opportunity after the current TTI
    ((t * 10) * (1 + tti / (t * 10)) + offset * 10 + a) % 10240
}

/// Computes "T" (si-Periodicity) and "n" (order in schedulingInfoList) for a
/// 0-based SIB index. Returns `None` when the SIB is not scheduled in SIB1.
///
/// SIB1 itself (`sib_index == 0`) has a fixed 20-frame periodicity and does
/// not consult the scheduling list.
pub fn si_periodicity_and_index(sib_index: u32, sib1: Option<&Sib1>) -> Option<(u32, usize)> {
    if sib_index == 0 {
        return Some((SIB1_PERIODICITY, 0));
    }
    let sib1 = sib1?;
    if sib_index == 1 {
        // SIB2 always rides the first SI message
        return sib1
            .sched_info_list
            .first()
            .map(|info| (info.si_periodicity, 0));
    }
    for (n, info) in sib1.sched_info_list.iter().enumerate() {
        for &mapped in &info.sib_map_info {
            if mapped == sib_index + 1 {
                return Some((info.si_periodicity, n));
            }
        }
    }
    None
}

/// Determines the SI window `(start_tti, length)` for a SIB.
///
/// `n` and `t` come from [`si_periodicity_and_index`]. SIB1 uses a fixed
/// one-subframe window at subframe 5 of every even frame.
pub fn si_window(tti: u32, sib_index: u32, n: usize, t: u32, sib1: Option<&Sib1>) -> (u32, u32) {
    if sib_index == 0 {
        return (sib_start_tti(tti, 2, 0, 5), 1);
    }
    let si_win_len = sib1.map_or(1, |s| s.si_win_len);
    let x = n as u32 * si_win_len;
    let a = x % 10;
    let offset = x / 10;
    (sib_start_tti(tti, t, offset, a), si_win_len)
}
