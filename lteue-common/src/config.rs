//! UE configuration
//!
//! Serde-backed configuration for the UE stack, loadable from YAML. Values
//! not present in the file fall back to defaults that match the timer and
//! scheduling constants of TS 36.331 where the standard defines them, and to
//! documented implementation choices where it does not.

use crate::error::Error;
use crate::types::Plmn;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default SIB acquisition timeout in milliseconds.
///
/// The standard does not specify this timeout. One full SFN cycle (10240 ms)
/// is at least twice the longest si-Periodicity (512 radio frames), so every
/// schedulable SIB gets a minimum of two full window cycles.
pub const DEFAULT_SIB_SEARCH_TIMEOUT_MS: u32 = 10240;

/// Default cell reselection period in milliseconds.
pub const DEFAULT_CELL_RESELECTION_PERIOD_MS: u32 = 10_000;

/// Default RLC SRB flush timeout before forcing the transition to idle.
pub const DEFAULT_RLC_FLUSH_TIMEOUT_MS: u32 = 2_000;

fn default_plmn() -> Plmn {
    Plmn::new(1, 1, false)
}

fn default_required_sibs() -> Vec<u32> {
    vec![0, 1, 2]
}

fn default_max_neighbours() -> usize {
    8
}

fn default_cell_reselection_period_ms() -> u32 {
    DEFAULT_CELL_RESELECTION_PERIOD_MS
}

fn default_rlc_flush_timeout_ms() -> u32 {
    DEFAULT_RLC_FLUSH_TIMEOUT_MS
}

fn default_sib_search_timeout_ms() -> u32 {
    DEFAULT_SIB_SEARCH_TIMEOUT_MS
}

fn default_t300_ms() -> u32 {
    1000
}

fn default_t301_ms() -> u32 {
    1000
}

fn default_t310_ms() -> u32 {
    1000
}

fn default_t311_ms() -> u32 {
    10_000
}

fn default_q_rxlev_min_dbm() -> f32 {
    -140.0
}

fn default_log_level() -> String {
    "info".to_string()
}

/// UE stack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeConfig {
    /// Home PLMN used as the initially selected PLMN.
    #[serde(default = "default_plmn")]
    pub plmn: Plmn,

    /// SIB indices (0-based: 0 = SIB1) required to camp on a cell, in order.
    #[serde(default = "default_required_sibs")]
    pub required_sibs: Vec<u32>,

    /// Maximum number of neighbour cells kept in the measurement list.
    #[serde(default = "default_max_neighbours")]
    pub max_neighbours: usize,

    /// Period of the self-rearming cell reselection procedure.
    #[serde(default = "default_cell_reselection_period_ms")]
    pub cell_reselection_period_ms: u32,

    /// Time to wait for RLC SRB flush before forcing the idle transition.
    #[serde(default = "default_rlc_flush_timeout_ms")]
    pub rlc_flush_timeout_ms: u32,

    /// Overall SIB acquisition timeout.
    #[serde(default = "default_sib_search_timeout_ms")]
    pub sib_search_timeout_ms: u32,

    /// T300 (connection request supervision), overridden by SIB2.
    #[serde(default = "default_t300_ms")]
    pub t300_ms: u32,

    /// T301 (reestablishment request supervision), overridden by SIB2.
    #[serde(default = "default_t301_ms")]
    pub t301_ms: u32,

    /// T310 (radio link failure detection), overridden by SIB2.
    #[serde(default = "default_t310_ms")]
    pub t310_ms: u32,

    /// T311 (reestablishment cell selection window), overridden by SIB2.
    #[serde(default = "default_t311_ms")]
    pub t311_ms: u32,

    /// Fallback Qrxlevmin when neither SIB1 nor SIB3 provided one.
    #[serde(default = "default_q_rxlev_min_dbm")]
    pub q_rxlev_min_dbm: f32,

    /// Default log level for the stack.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for UeConfig {
    fn default() -> Self {
        Self {
            plmn: default_plmn(),
            required_sibs: default_required_sibs(),
            max_neighbours: default_max_neighbours(),
            cell_reselection_period_ms: default_cell_reselection_period_ms(),
            rlc_flush_timeout_ms: default_rlc_flush_timeout_ms(),
            sib_search_timeout_ms: default_sib_search_timeout_ms(),
            t300_ms: default_t300_ms(),
            t301_ms: default_t301_ms(),
            t310_ms: default_t310_ms(),
            t311_ms: default_t311_ms(),
            q_rxlev_min_dbm: default_q_rxlev_min_dbm(),
            log_level: default_log_level(),
        }
    }
}

impl UeConfig {
    /// Loads a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: UeConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration from a YAML string.
    pub fn from_yaml_str(contents: &str) -> Result<Self, Error> {
        let config: UeConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), Error> {
        if self.required_sibs.is_empty() {
            return Err(Error::Config("required_sibs must not be empty".into()));
        }
        if let Some(&sib) = self.required_sibs.iter().find(|&&s| s >= 13) {
            return Err(Error::Config(format!(
                "required SIB index {sib} out of range (SIB1..SIB13 are 0..12)"
            )));
        }
        if self.max_neighbours == 0 {
            return Err(Error::Config("max_neighbours must be at least 1".into()));
        }
        if self.sib_search_timeout_ms == 0 {
            return Err(Error::Config("sib_search_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }
}
