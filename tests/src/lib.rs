//! Integration test framework for the lteue stack
//!
//! Provides recording mock collaborators and a [`TestBench`] that drives the
//! UE stack TTI by TTI, playing the role of the radio and the network.
//!
//! # Test Categories
//!
//! 1. **Attach** - connection establishment, T300 supervision, rejects
//! 2. **Paging** - PCCH processing and system information modification
//! 3. **System information** - SI window scheduling, retries and timeouts
//! 4. **Mobility** - handover and connection reestablishment

#![allow(missing_docs)]

pub mod test_fixtures;

pub use test_fixtures::{test_config, TestBench};

#[cfg(test)]
mod attach;
#[cfg(test)]
mod mobility;
#[cfg(test)]
mod paging;
#[cfg(test)]
mod system_information;
