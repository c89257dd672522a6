//! Accept-all collaborator stubs
//!
//! Minimal implementations of the downward interfaces used by the demo
//! binary and by tests that do not need call recording. Real deployments
//! provide PHY drivers, MAC/RLC/PDCP bearer paths and a NAS on top of the
//! same traits.

use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

use crate::interfaces::{
    GwInterface, MacInterface, NasInterface, PdcpInterface, PdnType, PhyInterface,
    RlcBearerMetrics, RlcInterface, RlcMetrics, SecurityContext, UeRntis, UsimInterface,
};
use lteue_common::error::Error;
use lteue_common::types::{BarringKind, FoundPlmn, PhyCell, Rnti, STmsi};

/// PHY stub with settable sync/camping state that accepts every request.
#[derive(Debug, Clone)]
pub struct NullPhy {
    pub accept_requests: bool,
    pub in_sync: bool,
    pub camping: bool,
}

impl Default for NullPhy {
    fn default() -> Self {
        Self {
            accept_requests: true,
            in_sync: false,
            camping: false,
        }
    }
}

impl PhyInterface for NullPhy {
    fn start_cell_search(&mut self) -> bool {
        self.accept_requests
    }
    fn start_cell_select(&mut self, _cell: PhyCell) -> bool {
        self.accept_requests
    }
    fn is_in_sync(&self) -> bool {
        self.in_sync
    }
    fn cell_is_camping(&self) -> bool {
        self.camping
    }
    fn reset(&mut self) {
        self.in_sync = false;
        self.camping = false;
    }
}

/// MAC stub that logs and accepts everything.
pub struct NullMac;

impl MacInterface for NullMac {
    fn run_tti(&mut self, _tti: u32) {}
    fn bcch_start_rx(&mut self, si_win_start_tti: u32, si_win_len: u32) {
        debug!(si_win_start_tti, si_win_len, "bcch_start_rx");
    }
    fn pcch_start_rx(&mut self) {}
    fn reset(&mut self) {}
    fn clear_rntis(&mut self) {}
    fn set_ho_rnti(&mut self, _rnti: Rnti, _pci: u16) {}
    fn start_cont_ho(&mut self) {}
    fn start_noncont_ho(&mut self, _preamble_index: u8, _prach_mask_index: u8) {}
    fn wait_uplink(&mut self) {}
    fn get_rntis(&self) -> UeRntis {
        UeRntis::default()
    }
    fn set_default_config(&mut self) {}
    fn set_default_dedicated_config(&mut self) {}
}

/// RLC stub reporting flushed signalling bearers.
#[derive(Default)]
pub struct NullRlc;

impl RlcInterface for NullRlc {
    fn reestablish(&mut self) {}
    fn suspend_bearer(&mut self, _lcid: u32) {}
    fn has_bearer(&self, lcid: u32) -> bool {
        lcid <= 2
    }
    fn stop(&mut self) {}
    fn get_metrics(&self) -> RlcMetrics {
        RlcMetrics {
            bearers: vec![
                RlcBearerMetrics {
                    lcid: 1,
                    tx_queued_bytes: 0,
                },
                RlcBearerMetrics {
                    lcid: 2,
                    tx_queued_bytes: 0,
                },
            ],
        }
    }
}

/// PDCP stub discarding every SDU.
pub struct NullPdcp;

impl PdcpInterface for NullPdcp {
    fn reestablish(&mut self) {}
    fn config_security_all(&mut self, _sec: &SecurityContext) {}
    fn write_sdu(&mut self, lcid: u32, pdu: Bytes, _blocking: bool) {
        debug!(lcid, len = pdu.len(), "pdcp write_sdu");
    }
}

/// NAS stub that services every page.
#[derive(Debug, Clone)]
pub struct NullNas {
    pub attached: bool,
}

impl Default for NullNas {
    fn default() -> Self {
        Self { attached: true }
    }
}

impl NasInterface for NullNas {
    fn plmn_search_completed(&mut self, found: &[FoundPlmn], nof_plmns: i32) {
        debug!(nof_plmns, found = found.len(), "plmn_search_completed");
    }
    fn connection_request_completed(&mut self, ok: bool) {
        debug!(ok, "connection_request_completed");
    }
    fn paging(&mut self, _s_tmsi: &STmsi) -> bool {
        true
    }
    fn set_barring(&mut self, kind: BarringKind) {
        debug!(%kind, "set_barring");
    }
    fn is_attached(&self) -> bool {
        self.attached
    }
}

/// USIM stub deriving a fixed key pattern.
pub struct NullUsim;

impl UsimInterface for NullUsim {
    fn generate_as_keys_ho(
        &mut self,
        target_pci: u16,
        earfcn: u32,
        ncc: Option<u8>,
        sec: &mut SecurityContext,
    ) {
        let seed = (u32::from(target_pci) ^ earfcn) as u8 ^ ncc.unwrap_or(0);
        sec.k_rrc_enc = [seed; 32];
        sec.k_rrc_int = [seed.wrapping_add(1); 32];
        sec.k_up_enc = [seed.wrapping_add(2); 32];
        sec.ncc = ncc;
    }
}

/// GW stub accepting every interface setup.
pub struct NullGw;

impl GwInterface for NullGw {
    fn setup_if_addr(
        &mut self,
        lcid: u32,
        _pdn_type: PdnType,
        _ipv4: Option<Ipv4Addr>,
        _ipv6: Option<Ipv6Addr>,
    ) -> Result<(), Error> {
        debug!(lcid, "setup_if_addr");
        Ok(())
    }
}
