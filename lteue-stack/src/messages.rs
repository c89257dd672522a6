//! RRC message model
//!
//! Decoded downlink message structures handed to the engine by the external
//! ASN.1 decoder, and simplified uplink PDU builders. Uplink messages use a
//! compact hand-built byte layout (type octet followed by fixed fields); the
//! real PER encoding belongs to the external codec.
//!
//! # Reference
//! - 3GPP TS 36.331: E-UTRA; RRC protocol specification

use lteue_common::types::{Plmn, Rnti, STmsi};

// ============================================================================
// System Information
// ============================================================================

/// One entry of SIB1's schedulingInfoList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedInfo {
    /// si-Periodicity in radio frames (8, 16, 32, ...)
    pub si_periodicity: u32,
    /// Mapped SIB type numbers (3 = SIB3, 4 = SIB4, ...)
    pub sib_map_info: Vec<u32>,
}

/// Decoded SystemInformationBlockType1.
#[derive(Debug, Clone, PartialEq)]
pub struct Sib1 {
    /// Cell identity
    pub cell_id: u32,
    /// PLMN identity list
    pub plmns: Vec<Plmn>,
    /// Tracking area code
    pub tac: u16,
    /// Qrxlevmin in dBm
    pub q_rxlev_min: f32,
    /// si-WindowLength in subframes
    pub si_win_len: u32,
    /// SI message scheduling
    pub sched_info_list: Vec<SchedInfo>,
}

impl Default for Sib1 {
    fn default() -> Self {
        Self {
            cell_id: 0,
            plmns: Vec::new(),
            tac: 0,
            q_rxlev_min: -140.0,
            si_win_len: 10,
            sched_info_list: Vec::new(),
        }
    }
}

/// ue-TimersAndConstants from SIB2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeTimersAndConstants {
    pub t300_ms: u32,
    pub t301_ms: u32,
    pub t310_ms: u32,
    pub t311_ms: u32,
    pub n310: u32,
    pub n311: u32,
}

impl Default for UeTimersAndConstants {
    fn default() -> Self {
        Self {
            t300_ms: 1000,
            t301_ms: 1000,
            t310_ms: 1000,
            t311_ms: 10_000,
            n310: 1,
            n311: 1,
        }
    }
}

/// Decoded SystemInformationBlockType2 (connection-control subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sib2 {
    /// Connection control timers and constants
    pub ue_timers: UeTimersAndConstants,
}

/// Decoded SystemInformationBlockType3 (reselection subset).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sib3 {
    /// q-Hyst in dB
    pub q_hyst_db: f32,
    /// Qrxlevmin for reselection, in dBm
    pub q_rxlev_min: f32,
}

impl Default for Sib3 {
    fn default() -> Self {
        Self {
            q_hyst_db: 4.0,
            q_rxlev_min: -140.0,
        }
    }
}

/// Decoded SystemInformationBlockType13 (MBMS subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sib13 {
    /// Whether an MCCH configuration is present
    pub mcch_present: bool,
}

/// A decoded system information block delivered by the lower layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SibMessage {
    Sib1(Sib1),
    Sib2(Sib2),
    Sib3(Sib3),
    Sib13(Sib13),
    /// SIBs the engine tracks by presence only (SIB4..SIB12)
    Other(u32),
}

impl SibMessage {
    /// The 0-based SIB index (0 = SIB1) of this message.
    pub fn index(&self) -> u32 {
        match self {
            SibMessage::Sib1(_) => 0,
            SibMessage::Sib2(_) => 1,
            SibMessage::Sib3(_) => 2,
            SibMessage::Sib13(_) => 12,
            SibMessage::Other(index) => *index,
        }
    }
}

// ============================================================================
// Paging
// ============================================================================

/// One pagingRecord from a Paging message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingRecord {
    /// Paged UE identity
    pub s_tmsi: STmsi,
}

/// Decoded Paging message from PCCH.
#[derive(Debug, Clone, Default)]
pub struct Paging {
    /// Paging records to match against the UE identity
    pub paging_records: Vec<PagingRecord>,
    /// systemInfoModification: all SIBs of the serving cell must be refreshed
    pub sys_info_mod: bool,
}

// ============================================================================
// Connection Reconfiguration
// ============================================================================

/// rach-ConfigDedicated for non-contention random access at handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RachConfigDedicated {
    pub ra_preamble_index: u8,
    pub ra_prach_mask_index: u8,
}

/// Common radio resource configuration carried in mobilityControlInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RrConfigCommon {
    /// prach-ConfigIndex of the target cell
    pub prach_config_index: u8,
    /// p0-NominalPUSCH of the target cell, dBm
    pub pusch_p0_nominal: i8,
}

/// Ciphering algorithm identifiers (EEA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherAlgorithm {
    #[default]
    Eea0,
    Eea1,
    Eea2,
    Eea3,
}

/// Integrity protection algorithm identifiers (EIA).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityAlgorithm {
    #[default]
    Eia0,
    Eia1,
    Eia2,
    Eia3,
}

/// securityAlgorithmConfig inside securityConfigHO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityAlgorithmConfig {
    pub cipher_algo: CipherAlgorithm,
    pub integrity_algo: IntegrityAlgorithm,
}

/// securityConfigHO (intra-LTE variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfigHo {
    /// keyChangeIndicator; a full key change is not supported
    pub key_change_ind: bool,
    /// nextHopChainingCount for the vertical key derivation
    pub next_hop_chaining_count: u8,
    /// Optional algorithm change
    pub algorithms: Option<SecurityAlgorithmConfig>,
}

/// mobilityControlInfo commanding an intra-LTE handover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobilityControlInfo {
    /// Target physical cell identity
    pub target_pci: u16,
    /// Target downlink EARFCN; serving EARFCN when absent
    pub carrier_freq: Option<u32>,
    /// newUE-Identity (C-RNTI on the target cell)
    pub new_ue_id: Rnti,
    /// T304 value in milliseconds
    pub t304_ms: u32,
    /// Dedicated RACH resources for non-contention access
    pub rach_cfg_ded: Option<RachConfigDedicated>,
    /// Common radio resource configuration of the target
    pub rr_cfg_common: RrConfigCommon,
}

/// Measurement configuration subset carried in a reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasConfig {
    /// EARFCNs of the configured measurement objects
    pub meas_object_earfcns: Vec<u32>,
    /// reportAmount of the configured report
    pub report_amount: u8,
}

/// Decoded RRCConnectionReconfiguration.
#[derive(Debug, Clone, Default)]
pub struct RrcConnectionReconfiguration {
    pub transaction_id: u8,
    /// Present when the reconfiguration commands a handover
    pub mobility_control_info: Option<MobilityControlInfo>,
    /// radioResourceConfigDedicated present
    pub rr_cfg_ded_present: bool,
    /// SCell configuration present
    pub scell_config_present: bool,
    /// Security material for the handover
    pub security_cfg_ho: Option<SecurityConfigHo>,
    /// Measurement configuration
    pub meas_config: Option<MeasConfig>,
}

// ============================================================================
// Uplink PDU builders
// ============================================================================

/// Simplified uplink message type codes.
pub mod uplink {
    use bytes::{BufMut, Bytes, BytesMut};
    use lteue_common::types::{EstablishmentCause, ReestablishmentCause, Rnti};

    /// RRCConnectionRequest message type octet
    pub const MSG_CONNECTION_REQUEST: u8 = 0x01;
    /// RRCConnectionSetupComplete message type octet
    pub const MSG_CONNECTION_SETUP_COMPLETE: u8 = 0x02;
    /// RRCConnectionReestablishmentRequest message type octet
    pub const MSG_REESTABLISHMENT_REQUEST: u8 = 0x03;
    /// RRCConnectionReconfigurationComplete message type octet
    pub const MSG_RECONFIGURATION_COMPLETE: u8 = 0x04;

    /// Builds an RRCConnectionRequest with a 40-bit initial UE identity.
    pub fn build_connection_request(cause: EstablishmentCause, ue_identity: u64) -> Bytes {
        let mut pdu = BytesMut::with_capacity(8);
        pdu.put_u8(MSG_CONNECTION_REQUEST);
        pdu.put_slice(&ue_identity.to_be_bytes()[3..8]);
        pdu.put_u8(cause.into());
        pdu.freeze()
    }

    /// Builds an RRCConnectionSetupComplete carrying the dedicated NAS PDU.
    pub fn build_setup_complete(selected_plmn_index: u8, nas_pdu: &[u8]) -> Bytes {
        let mut pdu = BytesMut::with_capacity(nas_pdu.len() + 3);
        pdu.put_u8(MSG_CONNECTION_SETUP_COMPLETE);
        pdu.put_u8(0x00); // transaction id
        pdu.put_u8(selected_plmn_index);
        pdu.put_slice(nas_pdu);
        pdu.freeze()
    }

    /// Builds an RRCConnectionReestablishmentRequest.
    pub fn build_reestablishment_request(
        cause: ReestablishmentCause,
        rnti: Rnti,
        source_pci: u16,
    ) -> Bytes {
        let mut pdu = BytesMut::with_capacity(6);
        pdu.put_u8(MSG_REESTABLISHMENT_REQUEST);
        pdu.put_u16(rnti);
        pdu.put_u16(source_pci);
        pdu.put_u8(cause.into());
        pdu.freeze()
    }

    /// Builds an RRCConnectionReconfigurationComplete.
    pub fn build_reconfiguration_complete(transaction_id: u8) -> Bytes {
        let mut pdu = BytesMut::with_capacity(2);
        pdu.put_u8(MSG_RECONFIGURATION_COMPLETE);
        pdu.put_u8(transaction_id);
        pdu.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lteue_common::types::{EstablishmentCause, ReestablishmentCause};

    #[test]
    fn test_sib_message_index() {
        assert_eq!(SibMessage::Sib1(Sib1::default()).index(), 0);
        assert_eq!(SibMessage::Sib2(Sib2::default()).index(), 1);
        assert_eq!(SibMessage::Sib3(Sib3::default()).index(), 2);
        assert_eq!(SibMessage::Sib13(Sib13::default()).index(), 12);
        assert_eq!(SibMessage::Other(5).index(), 5);
    }

    #[test]
    fn test_connection_request_layout() {
        let pdu =
            uplink::build_connection_request(EstablishmentCause::MoData, 0x12_3456_789A);
        assert_eq!(pdu.len(), 7);
        assert_eq!(pdu[0], uplink::MSG_CONNECTION_REQUEST);
        assert_eq!(&pdu[1..6], &[0x12, 0x34, 0x56, 0x78, 0x9A]);
        assert_eq!(pdu[6], u8::from(EstablishmentCause::MoData));
    }

    #[test]
    fn test_setup_complete_carries_nas_pdu() {
        let nas = [0x07, 0x41, 0x02];
        let pdu = uplink::build_setup_complete(1, &nas);
        assert_eq!(pdu[0], uplink::MSG_CONNECTION_SETUP_COMPLETE);
        assert_eq!(pdu[2], 1);
        assert_eq!(&pdu[3..], &nas);
    }

    #[test]
    fn test_reestablishment_request_layout() {
        let pdu = uplink::build_reestablishment_request(
            ReestablishmentCause::HandoverFailure,
            0x4601,
            257,
        );
        assert_eq!(pdu.len(), 6);
        assert_eq!(pdu[0], uplink::MSG_REESTABLISHMENT_REQUEST);
        assert_eq!(u16::from_be_bytes([pdu[1], pdu[2]]), 0x4601);
        assert_eq!(u16::from_be_bytes([pdu[3], pdu[4]]), 257);
        assert_eq!(pdu[5], u8::from(ReestablishmentCause::HandoverFailure));
    }

    #[test]
    fn test_reconfiguration_complete_layout() {
        let pdu = uplink::build_reconfiguration_complete(3);
        assert_eq!(pdu.as_ref(), &[uplink::MSG_RECONFIGURATION_COMPLETE, 3]);
    }
}
