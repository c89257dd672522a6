//! PHY controller facade
//!
//! Wraps the raw [`PhyInterface`] into the request/completion discipline the
//! procedures rely on: each `start_cell_search`/`start_cell_select` records
//! which procedure handle subscribed, stamped with the handle's launch
//! generation, and the engine routes the completion event to exactly that
//! subscriber. Completions for subscribers that have since completed or been
//! relaunched are dropped with a warning.

use crate::interfaces::PhyInterface;
use lteue_common::types::PhyCell;
use tracing::{debug, warn};

/// Procedure handles that can subscribe to PHY completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhySubscriber {
    /// The cell search procedure
    CellSearch,
    /// The cell selection procedure
    CellSelection,
    /// The handover procedure
    Handover,
}

impl std::fmt::Display for PhySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhySubscriber::CellSearch => write!(f, "Cell Search"),
            PhySubscriber::CellSelection => write!(f, "Cell Selection"),
            PhySubscriber::Handover => write!(f, "Handover"),
        }
    }
}

/// A recorded subscription: the subscribing handle and its launch generation.
pub type Subscription = (PhySubscriber, u64);

/// Facade between the RRC engine and the PHY driver.
pub struct PhyController {
    phy: Box<dyn PhyInterface>,
    search_subscriber: Option<Subscription>,
    select_subscriber: Option<Subscription>,
}

impl PhyController {
    /// Wraps a PHY driver.
    pub fn new(phy: Box<dyn PhyInterface>) -> Self {
        Self {
            phy,
            search_subscriber: None,
            select_subscriber: None,
        }
    }

    /// Requests a cell search, recording the subscriber for the completion.
    pub fn start_cell_search(&mut self, subscriber: PhySubscriber, generation: u64) -> bool {
        if !self.phy.start_cell_search() {
            warn!("PHY rejected cell search request");
            return false;
        }
        debug!(%subscriber, "cell search started");
        self.search_subscriber = Some((subscriber, generation));
        true
    }

    /// Requests a cell selection, recording the subscriber for the completion.
    pub fn start_cell_select(
        &mut self,
        cell: PhyCell,
        subscriber: PhySubscriber,
        generation: u64,
    ) -> bool {
        if !self.phy.start_cell_select(cell) {
            warn!(%cell, "PHY rejected cell select request");
            return false;
        }
        debug!(%cell, %subscriber, "cell select started");
        self.select_subscriber = Some((subscriber, generation));
        true
    }

    /// Takes the pending cell-search subscription, if any.
    pub fn take_search_subscriber(&mut self) -> Option<Subscription> {
        self.search_subscriber.take()
    }

    /// Takes the pending cell-select subscription, if any.
    pub fn take_select_subscriber(&mut self) -> Option<Subscription> {
        self.select_subscriber.take()
    }

    /// True while the PHY is synchronized to the serving cell.
    pub fn is_in_sync(&self) -> bool {
        self.phy.is_in_sync()
    }

    /// True while the PHY is camping on the serving cell.
    pub fn cell_is_camping(&self) -> bool {
        self.phy.cell_is_camping()
    }

    /// Resets the PHY and forgets pending subscriptions.
    pub fn reset(&mut self) {
        self.phy.reset();
        self.search_subscriber = None;
        self.select_subscriber = None;
    }
}
