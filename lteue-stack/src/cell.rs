//! Serving-cell model
//!
//! Tracks the serving cell and a bounded set of neighbour cells, each
//! identified by `(earfcn, pci)`, together with their last RSRP measurement
//! and the presence of SIB1..SIB13. The serving cell is always present; at
//! stack start it is a placeholder with no EARFCN that never passes the
//! selection criteria.

use crate::messages::{Sib1, Sib13, Sib2, Sib3};
use lteue_common::types::{Plmn, PhyCell};
use std::fmt;
use tracing::{debug, warn};

/// Number of SIB presence flags tracked per cell (SIB1..SIB13).
pub const NOF_SIBS: usize = 13;

/// A known cell with its measurements and system information.
#[derive(Debug, Clone)]
pub struct Cell {
    phy_cell: PhyCell,
    rsrp: f32,
    sibs: [bool; NOF_SIBS],
    sib1: Option<Sib1>,
    sib2: Option<Sib2>,
    sib3: Option<Sib3>,
    sib13: Option<Sib13>,
}

impl Cell {
    /// Creates a cell with no measurement yet (RSRP = NaN).
    pub fn new(phy_cell: PhyCell) -> Self {
        Self {
            phy_cell,
            rsrp: f32::NAN,
            sibs: [false; NOF_SIBS],
            sib1: None,
            sib2: None,
            sib3: None,
            sib13: None,
        }
    }

    /// Physical identity of the cell.
    pub fn phy_cell(&self) -> PhyCell {
        self.phy_cell
    }

    /// EARFCN of the cell.
    pub fn earfcn(&self) -> u32 {
        self.phy_cell.earfcn
    }

    /// PCI of the cell.
    pub fn pci(&self) -> u16 {
        self.phy_cell.pci
    }

    /// Last RSRP measurement in dBm; NaN if never measured.
    pub fn rsrp(&self) -> f32 {
        self.rsrp
    }

    /// Updates the RSRP measurement.
    pub fn set_rsrp(&mut self, rsrp_dbm: f32) {
        self.rsrp = rsrp_dbm;
    }

    /// True when the given 0-based SIB index has been acquired.
    pub fn has_sib(&self, sib_index: u32) -> bool {
        (sib_index as usize) < NOF_SIBS && self.sibs[sib_index as usize]
    }

    /// True when SIB1 has been acquired.
    pub fn has_sib1(&self) -> bool {
        self.has_sib(0)
    }

    /// True when SIB2 has been acquired.
    pub fn has_sib2(&self) -> bool {
        self.has_sib(1)
    }

    /// True when SIB3 has been acquired.
    pub fn has_sib3(&self) -> bool {
        self.has_sib(2)
    }

    /// Stores the decoded SIB1 and marks it present.
    pub fn set_sib1(&mut self, sib1: Sib1) {
        self.sib1 = Some(sib1);
        self.sibs[0] = true;
    }

    /// Stores the decoded SIB2 and marks it present.
    pub fn set_sib2(&mut self, sib2: Sib2) {
        self.sib2 = Some(sib2);
        self.sibs[1] = true;
    }

    /// Stores the decoded SIB3 and marks it present.
    pub fn set_sib3(&mut self, sib3: Sib3) {
        self.sib3 = Some(sib3);
        self.sibs[2] = true;
    }

    /// Stores the decoded SIB13 and marks it present.
    pub fn set_sib13(&mut self, sib13: Sib13) {
        self.sib13 = Some(sib13);
        self.sibs[12] = true;
    }

    /// Marks a presence-only SIB (SIB4..SIB12) as acquired.
    pub fn set_sib(&mut self, sib_index: u32) {
        if (sib_index as usize) < NOF_SIBS {
            self.sibs[sib_index as usize] = true;
        } else {
            warn!(sib_index, "SIB index out of range");
        }
    }

    /// The cached decoded SIB1, if acquired.
    pub fn sib1(&self) -> Option<&Sib1> {
        self.sib1.as_ref()
    }

    /// The cached decoded SIB2, if acquired.
    pub fn sib2(&self) -> Option<&Sib2> {
        self.sib2.as_ref()
    }

    /// The cached decoded SIB3, if acquired.
    pub fn sib3(&self) -> Option<&Sib3> {
        self.sib3.as_ref()
    }

    /// The cached decoded SIB13, if acquired.
    pub fn sib13(&self) -> Option<&Sib13> {
        self.sib13.as_ref()
    }

    /// Clears every SIB flag and cached payload atomically.
    pub fn reset_sibs(&mut self) {
        self.sibs = [false; NOF_SIBS];
        self.sib1 = None;
        self.sib2 = None;
        self.sib3 = None;
        self.sib13 = None;
    }

    /// True when SIB1 schedules the given 0-based SIB index.
    pub fn is_sib_scheduled(&self, sib_index: u32) -> bool {
        crate::si::si_periodicity_and_index(sib_index, self.sib1.as_ref()).is_some()
    }

    /// Number of PLMNs announced in SIB1.
    pub fn nof_plmns(&self) -> usize {
        self.sib1.as_ref().map_or(0, |s| s.plmns.len())
    }

    /// PLMN at position `i` of SIB1's list.
    pub fn plmn(&self, i: usize) -> Option<Plmn> {
        self.sib1.as_ref().and_then(|s| s.plmns.get(i).copied())
    }

    /// Tracking area code announced in SIB1.
    pub fn tac(&self) -> u16 {
        self.sib1.as_ref().map_or(0, |s| s.tac)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, rsrp={:.1} dBm",
            self.phy_cell, self.rsrp
        )
    }
}

/// Serving cell plus bounded neighbour set.
pub struct MeasCellList {
    serving: Cell,
    neighbours: Vec<Cell>,
    max_neighbours: usize,
}

impl MeasCellList {
    /// Creates a list with a placeholder serving cell.
    pub fn new(max_neighbours: usize) -> Self {
        Self {
            serving: Cell::new(PhyCell::default()),
            neighbours: Vec::new(),
            max_neighbours,
        }
    }

    /// The serving cell. Always present.
    pub fn serving_cell(&self) -> &Cell {
        &self.serving
    }

    /// Mutable access to the serving cell.
    pub fn serving_cell_mut(&mut self) -> &mut Cell {
        &mut self.serving
    }

    /// Number of known neighbour cells.
    pub fn nof_neighbours(&self) -> usize {
        self.neighbours.len()
    }

    /// Neighbour at insertion position `index`.
    pub fn neighbour(&self, index: usize) -> Option<&Cell> {
        self.neighbours.get(index)
    }

    /// Looks up a neighbour by identity.
    pub fn get_neighbour(&self, earfcn: u32, pci: u16) -> Option<&Cell> {
        self.neighbours
            .iter()
            .find(|c| c.earfcn() == earfcn && c.pci() == pci)
    }

    /// Mutable neighbour lookup by identity.
    pub fn get_neighbour_mut(&mut self, earfcn: u32, pci: u16) -> Option<&mut Cell> {
        self.neighbours
            .iter_mut()
            .find(|c| c.earfcn() == earfcn && c.pci() == pci)
    }

    /// True when the identity is a known neighbour.
    pub fn has_neighbour(&self, earfcn: u32, pci: u16) -> bool {
        self.get_neighbour(earfcn, pci).is_some()
    }

    /// Adds a neighbour cell. Rejects duplicates and enforces the bound.
    pub fn add_meas_cell(&mut self, cell: Cell) -> bool {
        if cell.phy_cell() == self.serving.phy_cell() {
            debug!(cell = %cell.phy_cell(), "cell is already serving");
            return true;
        }
        if self.has_neighbour(cell.earfcn(), cell.pci()) {
            debug!(cell = %cell.phy_cell(), "neighbour already known");
            return true;
        }
        if self.neighbours.len() >= self.max_neighbours {
            warn!(
                cell = %cell.phy_cell(),
                max = self.max_neighbours,
                "neighbour list full, dropping cell"
            );
            return false;
        }
        self.neighbours.push(cell);
        true
    }

    /// Promotes the neighbour with the given identity to serving.
    ///
    /// The previous serving cell takes the promoted neighbour's slot so that
    /// insertion-order iteration stays stable, unless `discard_current` is
    /// set or it was the startup placeholder. Returns false when the
    /// identity is neither a neighbour nor the current serving cell.
    pub fn set_serving(&mut self, phy_cell: PhyCell, discard_current: bool) -> bool {
        if phy_cell == self.serving.phy_cell() {
            return true;
        }
        let Some(pos) = self
            .neighbours
            .iter()
            .position(|c| c.phy_cell() == phy_cell)
        else {
            warn!(cell = %phy_cell, "cannot promote unknown cell to serving");
            return false;
        };
        std::mem::swap(&mut self.serving, &mut self.neighbours[pos]);
        let keep_old = !discard_current && self.neighbours[pos].phy_cell() != PhyCell::default();
        if !keep_old {
            self.neighbours.remove(pos);
        }
        true
    }

    /// Applies a new RSRP measurement, creating the cell when unknown.
    pub fn new_cell_meas(&mut self, earfcn: u32, pci: u16, rsrp_dbm: f32) {
        if self.serving.earfcn() == earfcn && self.serving.pci() == pci {
            self.serving.set_rsrp(rsrp_dbm);
            return;
        }
        if let Some(cell) = self.get_neighbour_mut(earfcn, pci) {
            cell.set_rsrp(rsrp_dbm);
            return;
        }
        let mut cell = Cell::new(PhyCell::new(earfcn, pci));
        cell.set_rsrp(rsrp_dbm);
        self.add_meas_cell(cell);
    }

    /// Formats the neighbour set for logging.
    pub fn print_neighbours(&self) -> String {
        self.neighbours
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
