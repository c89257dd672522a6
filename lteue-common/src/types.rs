//! Common control-plane types for the LTE UE stack
//!
//! Identifiers and enumerations shared between the RRC engine, its
//! collaborators and the configuration layer.
//!
//! # Reference
//! - 3GPP TS 36.331: E-UTRA; RRC protocol specification
//! - 3GPP TS 23.003: Numbering, addressing and identification

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell Radio Network Temporary Identifier.
pub type Rnti = u16;

/// PLMN (Public Land Mobile Network) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Plmn {
    /// Mobile Country Code
    pub mcc: u16,
    /// Mobile Network Code
    pub mnc: u16,
    /// True when the MNC uses three digits
    #[serde(default)]
    pub long_mnc: bool,
}

impl Plmn {
    /// Creates a new PLMN identity.
    pub fn new(mcc: u16, mnc: u16, long_mnc: bool) -> Self {
        Self { mcc, mnc, long_mnc }
    }

    /// Returns true if the PLMN carries a real value.
    pub fn has_value(&self) -> bool {
        self.mcc != 0 || self.mnc != 0
    }
}

impl fmt::Display for Plmn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.long_mnc {
            write!(f, "{:03}-{:03}", self.mcc, self.mnc)
        } else {
            write!(f, "{:03}-{:02}", self.mcc, self.mnc)
        }
    }
}

/// Tracking Area Identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tai {
    /// PLMN part of the TAI
    pub plmn: Plmn,
    /// Tracking Area Code
    pub tac: u16,
}

impl Tai {
    /// Creates a new TAI.
    pub fn new(plmn: Plmn, tac: u16) -> Self {
        Self { plmn, tac }
    }
}

impl fmt::Display for Tai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/tac={}", self.plmn, self.tac)
    }
}

/// SAE Temporary Mobile Subscriber Identity, used to match paging records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct STmsi {
    /// MME code
    pub mmec: u8,
    /// M-TMSI
    pub m_tmsi: u32,
}

impl STmsi {
    /// Creates a new S-TMSI.
    pub fn new(mmec: u8, m_tmsi: u32) -> Self {
        Self { mmec, m_tmsi }
    }

    /// Packs the identity into the 40-bit value carried in RRC messages.
    pub fn to_u64(self) -> u64 {
        (u64::from(self.mmec) << 32) | u64::from(self.m_tmsi)
    }
}

impl fmt::Display for STmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mmec, self.m_tmsi)
    }
}

/// Physical-layer cell identity: an EARFCN plus a PCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhyCell {
    /// E-UTRA Absolute Radio Frequency Channel Number
    pub earfcn: u32,
    /// Physical Cell Identity
    pub pci: u16,
}

impl PhyCell {
    /// Creates a new physical cell identity.
    pub fn new(earfcn: u32, pci: u16) -> Self {
        Self { earfcn, pci }
    }
}

impl fmt::Display for PhyCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "earfcn={}, pci={}", self.earfcn, self.pci)
    }
}

/// A PLMN/TAC pair reported to NAS by the PLMN search procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundPlmn {
    /// PLMN identity read from SIB1
    pub plmn: Plmn,
    /// Tracking area code read from SIB1
    pub tac: u16,
}

/// RRC connection establishment cause (TS 36.331 Section 6.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EstablishmentCause {
    /// Emergency call
    Emergency = 0,
    /// High priority access
    HighPriorityAccess = 1,
    /// Mobile terminated access (paging response)
    MtAccess = 2,
    /// Mobile originated signalling
    MoSignalling = 3,
    /// Mobile originated data
    MoData = 4,
}

impl fmt::Display for EstablishmentCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstablishmentCause::Emergency => write!(f, "emergency"),
            EstablishmentCause::HighPriorityAccess => write!(f, "highPriorityAccess"),
            EstablishmentCause::MtAccess => write!(f, "mt-Access"),
            EstablishmentCause::MoSignalling => write!(f, "mo-Signalling"),
            EstablishmentCause::MoData => write!(f, "mo-Data"),
        }
    }
}

/// RRC connection reestablishment cause (TS 36.331 Section 6.2.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ReestablishmentCause {
    /// Reconfiguration failure
    ReconfigFailure = 0,
    /// Handover failure
    HandoverFailure = 1,
    /// Any other failure (e.g. radio link failure)
    OtherFailure = 2,
}

impl fmt::Display for ReestablishmentCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReestablishmentCause::ReconfigFailure => write!(f, "Reconfiguration failure"),
            ReestablishmentCause::HandoverFailure => write!(f, "Handover failure"),
            ReestablishmentCause::OtherFailure => write!(f, "Other failure"),
        }
    }
}

/// Access barring categories reported to NAS while T302 runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarringKind {
    /// No barring active
    None,
    /// Mobile originated data barred
    MoData,
    /// Mobile originated signalling barred
    MoSignalling,
    /// All access barred
    All,
}

impl fmt::Display for BarringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarringKind::None => write!(f, "none"),
            BarringKind::MoData => write!(f, "mo-Data"),
            BarringKind::MoSignalling => write!(f, "mo-Signalling"),
            BarringKind::All => write!(f, "all"),
        }
    }
}
