//! Downward interfaces of the RRC engine
//!
//! The engine drives PHY, MAC, RLC, PDCP, GW, USIM and NAS through these
//! traits. Real implementations live outside this crate (drivers, bearer
//! paths, the NAS state machines); the integration tests provide recording
//! mocks.

use bytes::Bytes;
use lteue_common::error::Error;
use lteue_common::types::{BarringKind, FoundPlmn, PhyCell, Rnti, STmsi};
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::messages::{CipherAlgorithm, IntegrityAlgorithm};

// ============================================================================
// PHY
// ============================================================================

/// Verdict of a PHY cell search on one frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSearchOutcome {
    /// A cell was found and is reported in `found_cell`
    CellFound,
    /// The frequency carries no detectable cell
    CellNotFound,
    /// The search failed
    Error,
}

/// Whether more frequencies remain to be searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastFreq {
    /// More frequencies follow; relaunch the search to continue
    MoreFreqs,
    /// The frequency list is exhausted
    NoMoreFreqs,
}

/// Completion event of a PHY cell search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSearchResult {
    pub found: CellSearchOutcome,
    pub last_freq: LastFreq,
    pub found_cell: Option<PhyCell>,
}

impl Default for CellSearchResult {
    fn default() -> Self {
        Self {
            found: CellSearchOutcome::Error,
            last_freq: LastFreq::NoMoreFreqs,
            found_cell: None,
        }
    }
}

/// Physical layer control surface.
///
/// All operations are non-blocking; completions arrive as events routed by
/// the PHY controller facade.
pub trait PhyInterface: Send {
    /// Requests a cell search on the next frequency. Returns true when the
    /// PHY accepted the request.
    fn start_cell_search(&mut self) -> bool;
    /// Requests synchronization to the given cell. Returns true when the PHY
    /// accepted the request.
    fn start_cell_select(&mut self, cell: PhyCell) -> bool;
    /// True while the PHY is synchronized to the serving cell.
    fn is_in_sync(&self) -> bool;
    /// True while the PHY is camping on the serving cell.
    fn cell_is_camping(&self) -> bool;
    /// Resets the PHY (used during handover).
    fn reset(&mut self);
}

// ============================================================================
// MAC
// ============================================================================

/// RNTIs currently held by the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UeRntis {
    pub crnti: Rnti,
}

/// MAC control surface.
pub trait MacInterface: Send {
    /// One MAC scheduler tick per TTI.
    fn run_tti(&mut self, tti: u32);
    /// Starts BCCH reception for an SI window.
    fn bcch_start_rx(&mut self, si_win_start_tti: u32, si_win_len: u32);
    /// Starts PCCH (paging) reception.
    fn pcch_start_rx(&mut self);
    /// Full MAC reset.
    fn reset(&mut self);
    /// Clears all allocated RNTIs.
    fn clear_rntis(&mut self);
    /// Programs the handover C-RNTI for the target cell.
    fn set_ho_rnti(&mut self, rnti: Rnti, pci: u16);
    /// Starts contention-based random access for handover.
    fn start_cont_ho(&mut self);
    /// Starts non-contention random access with dedicated resources.
    fn start_noncont_ho(&mut self, preamble_index: u8, prach_mask_index: u8);
    /// Blocks new uplink grants until the current ones drain.
    fn wait_uplink(&mut self);
    /// Reads the currently held RNTIs.
    fn get_rntis(&self) -> UeRntis;
    /// Applies the default MAC main configuration.
    fn set_default_config(&mut self);
    /// Applies the default dedicated MAC configuration.
    fn set_default_dedicated_config(&mut self);
}

// ============================================================================
// RLC / PDCP
// ============================================================================

/// Per-bearer RLC transmit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlcBearerMetrics {
    pub lcid: u32,
    pub tx_queued_bytes: u32,
}

/// RLC metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct RlcMetrics {
    pub bearers: Vec<RlcBearerMetrics>,
}

impl RlcMetrics {
    /// True when SRB1 and SRB2 have no queued transmit data.
    pub fn srbs_flushed(&self) -> bool {
        self.bearers
            .iter()
            .filter(|b| b.lcid == 1 || b.lcid == 2)
            .all(|b| b.tx_queued_bytes == 0)
    }
}

/// RLC control surface.
pub trait RlcInterface: Send {
    /// Reestablishes every RLC entity.
    fn reestablish(&mut self);
    /// Suspends the bearer with the given LCID.
    fn suspend_bearer(&mut self, lcid: u32);
    /// True when a bearer with the given LCID exists.
    fn has_bearer(&self, lcid: u32) -> bool;
    /// Stops the RLC.
    fn stop(&mut self);
    /// Reads a metrics snapshot.
    fn get_metrics(&self) -> RlcMetrics;
}

/// PDCP control surface.
pub trait PdcpInterface: Send {
    /// Reestablishes every PDCP entity.
    fn reestablish(&mut self);
    /// Reprograms security on all bearers.
    fn config_security_all(&mut self, sec: &SecurityContext);
    /// Submits an SDU for transmission on the given LCID.
    fn write_sdu(&mut self, lcid: u32, pdu: Bytes, blocking: bool);
}

// ============================================================================
// GW / USIM / NAS
// ============================================================================

/// PDN type of a default bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdnType {
    Ipv4,
    Ipv6,
    Ipv4v6,
}

/// Gateway (user plane) control surface.
pub trait GwInterface: Send {
    /// Configures the network interface address of a bearer.
    fn setup_if_addr(
        &mut self,
        lcid: u32,
        pdn_type: PdnType,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<(), Error>;
}

/// AS security material held by the RRC.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityContext {
    pub cipher_algo: CipherAlgorithm,
    pub integrity_algo: IntegrityAlgorithm,
    pub k_rrc_enc: [u8; 32],
    pub k_rrc_int: [u8; 32],
    pub k_up_enc: [u8; 32],
    /// nextHopChainingCount used for the last derivation
    pub ncc: Option<u8>,
}

/// USIM key derivation surface.
pub trait UsimInterface: Send {
    /// Derives the AS key hierarchy for a handover to `target_pci`.
    fn generate_as_keys_ho(
        &mut self,
        target_pci: u16,
        earfcn: u32,
        ncc: Option<u8>,
        sec: &mut SecurityContext,
    );
}

/// Upper-layer NAS surface.
pub trait NasInterface: Send {
    /// Delivers the PLMN search result; `nof_plmns` is -1 on error.
    fn plmn_search_completed(&mut self, found: &[FoundPlmn], nof_plmns: i32);
    /// Reports the outcome of a connection establishment attempt.
    fn connection_request_completed(&mut self, ok: bool);
    /// Starts the NAS paging response procedure. Returns false when NAS
    /// cannot service the page.
    fn paging(&mut self, s_tmsi: &STmsi) -> bool;
    /// Updates the access barring state.
    fn set_barring(&mut self, kind: BarringKind);
    /// True while the UE is EMM-attached.
    fn is_attached(&self) -> bool;
}
