//! LTE UE RRC procedure engine
//!
//! This crate implements the control-plane core of an LTE UE: the RRC
//! procedure engine driving cell search, system-information acquisition,
//! cell selection/reselection, connection establishment, paging, the
//! transition to idle, connection reestablishment and intra-LTE handover,
//! plus the single-threaded cooperative stack scheduling around it.
//!
//! - [`proc`] - the cooperative procedure runtime (handles, futures, events)
//! - [`timers`] - millisecond timer service stepped once per TTI
//! - [`task_queue`] - bounded multi-producer stack queue and background pool
//! - [`cell`] - serving/neighbour cell model
//! - [`si`] - SI window scheduling per TS 36.331 Section 5.2.3
//! - [`rrc`] - the engine and its eleven procedures
//! - [`stack`] - the stack surface tying everything together

pub mod cell;
pub mod interfaces;
pub mod messages;
pub mod phy_ctrl;
pub mod proc;
pub mod rrc;
pub mod si;
pub mod stack;
pub mod stubs;
pub mod task_queue;
pub mod timers;

pub use cell::{Cell, MeasCellList};
pub use interfaces::{
    CellSearchOutcome, CellSearchResult, GwInterface, LastFreq, MacInterface, NasInterface,
    PdcpInterface, PdnType, PhyInterface, RlcBearerMetrics, RlcInterface, RlcMetrics,
    SecurityContext, UeRntis, UsimInterface,
};
pub use messages::{
    MobilityControlInfo, Paging, PagingRecord, RachConfigDedicated, RrcConnectionReconfiguration,
    SchedInfo, SecurityAlgorithmConfig, SecurityConfigHo, Sib1, Sib13, Sib2, Sib3, SibMessage,
    UeTimersAndConstants,
};
pub use phy_ctrl::{PhyController, PhySubscriber};
pub use proc::{ProcBusy, ProcFuture, ProcHandle, ProcOutcome, ProcResult, Procedure};
pub use rrc::procedures::{CsResult, ReestOutcome};
pub use rrc::state::{RrcState, RrcStateMachine, RrcTransition};
pub use rrc::{ProcId, Rrc, RrcMetrics, RrcTimer};
pub use stack::{StackMetrics, StackTask, UeStack, UeStackHandle};
pub use timers::{TimerId, TimerService};
