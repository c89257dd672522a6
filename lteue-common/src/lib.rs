//! Common types and utilities for lteue
//!
//! This crate provides shared types, configuration structures, logging setup
//! and the workspace error enum used by the LTE UE stack crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    UeConfig, DEFAULT_CELL_RESELECTION_PERIOD_MS, DEFAULT_RLC_FLUSH_TIMEOUT_MS,
    DEFAULT_SIB_SEARCH_TIMEOUT_MS,
};
pub use error::Error;
pub use logging::{
    format_hex_dump, init_logging, init_logging_with_filter, log_rrc_message, Direction, HexDump,
    LogLevel,
};
pub use types::{
    BarringKind, EstablishmentCause, FoundPlmn, PhyCell, Plmn, ReestablishmentCause, Rnti, STmsi,
    Tai,
};
