//! lteue demo binary
//!
//! Drives the UE stack against a simulated single-cell radio: switches the
//! UE on, answers the engine's PHY requests, feeds system information and
//! walks through PLMN search and connection establishment, printing the
//! resulting metrics.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lteue_common::config::UeConfig;
use lteue_common::logging::init_logging;
use lteue_common::types::{EstablishmentCause, PhyCell, STmsi};
use lteue_stack::interfaces::{CellSearchOutcome, CellSearchResult, LastFreq, PhyInterface};
use lteue_stack::messages::{SchedInfo, Sib1, Sib2, Sib3, SibMessage};
use lteue_stack::stack::{StackMetrics, UeStack};
use lteue_stack::stubs::{NullGw, NullMac, NullNas, NullPdcp, NullRlc, NullUsim};

/// EARFCN of the simulated cell.
const SIM_EARFCN: u32 = 6400;
/// PCI of the simulated cell.
const SIM_PCI: u16 = 1;
/// RSRP reported for the simulated cell.
const SIM_RSRP_DBM: f32 = -78.0;

#[derive(Parser)]
#[command(name = "lteue", about = "LTE UE RRC procedure engine demo")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of TTIs to simulate
    #[arg(short, long, default_value_t = 2000)]
    ttis: u32,
}

#[derive(Default)]
struct SimPhyState {
    search_pending: bool,
    select_pending: bool,
    in_sync: bool,
    camping: bool,
}

/// Single-cell PHY simulator: records requests for the drive loop to answer.
#[derive(Clone, Default)]
struct SimPhy(Arc<Mutex<SimPhyState>>);

impl SimPhy {
    fn take_search(&self) -> bool {
        std::mem::take(&mut self.0.lock().unwrap().search_pending)
    }

    fn take_select(&self) -> bool {
        std::mem::take(&mut self.0.lock().unwrap().select_pending)
    }

    fn set_link(&self, in_sync: bool, camping: bool) {
        let mut state = self.0.lock().unwrap();
        state.in_sync = in_sync;
        state.camping = camping;
    }

    fn is_camping(&self) -> bool {
        self.0.lock().unwrap().camping
    }
}

impl PhyInterface for SimPhy {
    fn start_cell_search(&mut self) -> bool {
        self.0.lock().unwrap().search_pending = true;
        true
    }
    fn start_cell_select(&mut self, _cell: PhyCell) -> bool {
        self.0.lock().unwrap().select_pending = true;
        true
    }
    fn is_in_sync(&self) -> bool {
        self.0.lock().unwrap().in_sync
    }
    fn cell_is_camping(&self) -> bool {
        self.0.lock().unwrap().camping
    }
    fn reset(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.in_sync = false;
        state.camping = false;
    }
}

fn demo_sib1(cfg: &UeConfig) -> Sib1 {
    Sib1 {
        cell_id: 0x0019_B01,
        plmns: vec![cfg.plmn],
        tac: 0x0001,
        q_rxlev_min: -140.0,
        si_win_len: 10,
        sched_info_list: vec![
            SchedInfo {
                si_periodicity: 8,
                sib_map_info: vec![],
            },
            SchedInfo {
                si_periodicity: 16,
                sib_map_info: vec![3],
            },
        ],
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => UeConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => UeConfig::default(),
    };

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&cfg.log_level)
        .parse()
        .unwrap_or_default();
    init_logging(level);

    let sim_phy = SimPhy::default();
    let mut stack = UeStack::new(
        cfg.clone(),
        Box::new(sim_phy.clone()),
        Box::new(NullMac),
        Box::new(NullRlc),
        Box::new(NullPdcp),
        Box::new(NullNas::default()),
        Box::new(NullUsim),
        Box::new(NullGw),
    )
    .context("building the UE stack")?;

    stack.rrc_mut().plmn_select(cfg.plmn);
    stack.rrc_mut().set_ue_identity(STmsi::new(1, 2));
    stack.switch_on();

    let mut connect_requested = false;
    for tti in 1..=args.ttis {
        stack.run_tti_direct(tti);

        // answer pending PHY requests like a single-cell radio would
        if sim_phy.take_search() {
            stack.rrc_mut().cell_search_completed(CellSearchResult {
                found: CellSearchOutcome::CellFound,
                last_freq: LastFreq::NoMoreFreqs,
                found_cell: Some(PhyCell::new(SIM_EARFCN, SIM_PCI)),
            });
            stack.rrc_mut().new_cell_meas(SIM_EARFCN, SIM_PCI, SIM_RSRP_DBM);
        }
        if sim_phy.take_select() {
            sim_phy.set_link(true, true);
            stack.rrc_mut().cell_select_completed(true);
        }

        // deliver system information while the UE is acquiring it
        if sim_phy.is_camping() {
            let (has_sib1, has_sib2, has_sib3) = {
                let serving = stack.rrc().meas_cells().serving_cell();
                (serving.has_sib1(), serving.has_sib2(), serving.has_sib3())
            };
            if !has_sib1 {
                let sib1 = demo_sib1(&cfg);
                stack.rrc_mut().handle_sib(SibMessage::Sib1(sib1));
            } else if !has_sib2 {
                stack.rrc_mut().handle_sib(SibMessage::Sib2(Sib2::default()));
            } else if !has_sib3 {
                stack.rrc_mut().handle_sib(SibMessage::Sib3(Sib3::default()));
            }
        }

        // once the PLMN search finished, ask for a connection
        if !connect_requested
            && stack.rrc().procs().plmn_searcher.is_idle()
            && stack.rrc().state().is_idle()
            && sim_phy.is_camping()
        {
            stack
                .rrc_mut()
                .start_connection_request(EstablishmentCause::MoData, None);
            connect_requested = true;
        }

        // the simulated network accepts every connection request
        if stack.rrc().state().is_connecting() {
            stack.rrc_mut().connection_setup();
        }
    }

    let mut metrics = StackMetrics {
        rrc: stack.rrc().get_metrics(),
        rlc: Default::default(),
    };
    stack.get_metrics(&mut metrics);
    info!(
        state = %metrics.rrc.state,
        serving = %metrics.rrc.serving_cell,
        rsrp = metrics.rrc.serving_rsrp_dbm,
        neighbours = metrics.rrc.nof_neighbours,
        "simulation finished"
    );
    println!(
        "final state: {} on {} (rsrp {:.1} dBm)",
        metrics.rrc.state, metrics.rrc.serving_cell, metrics.rrc.serving_rsrp_dbm
    );

    stack.stop();
    Ok(())
}
