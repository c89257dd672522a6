//! Handover procedure
//!
//! Executes an intra-LTE handover commanded by an
//! RRCConnectionReconfiguration with mobilityControlInfo (TS 36.331 Section
//! 5.3.5.4): resets the lower layers, synchronizes to the target cell under
//! T304 supervision, rederives the AS keys, and completes when the random
//! access on the target succeeds. On failure, a still-running T304 drives
//! the reestablishment externally.

use tracing::{error, info, warn};

use crate::messages::{MobilityControlInfo, RrcConnectionReconfiguration};
use crate::phy_ctrl::PhySubscriber;
use crate::proc::{ProcOutcome, ProcResult, Procedure};
use crate::rrc::Rrc;
use lteue_common::types::{PhyCell, Rnti};

/// Events consumed by the handover procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverEvent {
    /// PHY selection of the target cell completed.
    CellSelectResult(bool),
    /// T304 expired before the handover finished.
    T304Expiry,
    /// Random access on the target cell completed.
    RaCompleted(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HoState {
    #[default]
    LaunchPhyCellSelect,
    WaitPhyCellSelectComplete,
    WaitRaCompletion,
}

/// Handover procedure state.
#[derive(Default)]
pub struct HandoverProc {
    recfg: RrcConnectionReconfiguration,
    target_earfcn: u32,
    state: HoState,
    ho_src_cell: PhyCell,
    ho_src_rnti: Rnti,
}

impl HandoverProc {
    fn mobility_info(&self) -> Option<MobilityControlInfo> {
        self.recfg.mobility_control_info.clone()
    }

    fn handle_cell_select_result(&mut self, rrc: &mut Rrc, cs_ret: bool) -> ProcOutcome {
        if self.state != HoState::WaitPhyCellSelectComplete {
            warn!("unexpected PHY cell selection event");
            return ProcOutcome::Yield;
        }
        let Some(mob) = self.mobility_info() else {
            return ProcOutcome::Error;
        };

        // the target may have been dropped from the neighbour list meanwhile
        let Some(target) = rrc
            .meas_cells
            .get_neighbour(self.target_earfcn, mob.target_pci)
            .map(|c| c.phy_cell())
        else {
            error!("target cell removed from neighbours, aborting handover");
            return ProcOutcome::Error;
        };

        if !cs_ret {
            error!(cell = %target, "could not synchronize with the target cell");
            // keep the cell out of subsequent reselections
            if let Some(cell) = rrc
                .meas_cells
                .get_neighbour_mut(self.target_earfcn, mob.target_pci)
            {
                cell.set_rsrp(f32::NEG_INFINITY);
            }
            return ProcOutcome::Error;
        }

        rrc.meas_cells.set_serving(target, false);

        if self.recfg.scell_config_present {
            rrc.apply_scell_config();
        }

        if let Some(rach) = mob.rach_cfg_ded {
            info!(
                preamble = rach.ra_preamble_index,
                mask = rach.ra_prach_mask_index,
                "starting non-contention based random access"
            );
            rrc.mac
                .start_noncont_ho(rach.ra_preamble_index, rach.ra_prach_mask_index);
        } else {
            info!("starting contention-based random access");
            rrc.mac.start_cont_ho();
        }

        let mut ncc = None;
        if let Some(sec_ho) = self.recfg.security_cfg_ho {
            ncc = Some(sec_ho.next_hop_chaining_count);
            if sec_ho.key_change_ind {
                error!("keyChangeIndicator in securityConfigHO not supported");
                return ProcOutcome::Error;
            }
            if let Some(algorithms) = sec_ho.algorithms {
                rrc.sec_cfg.cipher_algo = algorithms.cipher_algo;
                rrc.sec_cfg.integrity_algo = algorithms.integrity_algo;
                info!("changed ciphering and integrity algorithms");
            }
        }

        let serving_earfcn = rrc.meas_cells.serving_cell().earfcn();
        rrc.usim
            .generate_as_keys_ho(mob.target_pci, serving_earfcn, ncc, &mut rrc.sec_cfg);
        rrc.pdcp.config_security_all(&rrc.sec_cfg);

        // have the reconfiguration complete ready when Msg3 is sent
        rrc.send_reconfig_complete(self.recfg.transaction_id);

        self.state = HoState::WaitRaCompletion;
        ProcOutcome::Yield
    }
}

impl Procedure for HandoverProc {
    type Context = Rrc;
    type Args = RrcConnectionReconfiguration;
    type Event = HandoverEvent;
    type Output = ();

    const NAME: &'static str = "Handover";

    fn init(&mut self, rrc: &mut Rrc, recfg: RrcConnectionReconfiguration) -> ProcOutcome {
        info!("starting handover preparation");
        self.recfg = recfg;
        self.state = HoState::LaunchPhyCellSelect;

        let Some(mob) = self.mobility_info() else {
            error!("reconfiguration carries no mobilityControlInfo");
            return ProcOutcome::Error;
        };

        let serving = rrc.meas_cells.serving_cell().phy_cell();
        if mob.target_pci == serving.pci {
            warn!("received handover command to own cell");
            rrc.con_reconfig_failed();
            return ProcOutcome::Error;
        }

        self.target_earfcn = mob.carrier_freq.unwrap_or(serving.earfcn);
        if !rrc.meas_cells.has_neighbour(self.target_earfcn, mob.target_pci) {
            error!(
                earfcn = self.target_earfcn,
                pci = mob.target_pci,
                "could not find the handover target cell"
            );
            rrc.con_reconfig_failed();
            return ProcOutcome::Error;
        }

        info!(target_pci = mob.target_pci, "received handover command");

        // save the source cell and RNTI for the measurement reconfiguration
        self.ho_src_cell = serving;
        self.ho_src_rnti = rrc.mac.get_rntis().crnti;

        // TS 36.331 Section 5.3.5.4
        rrc.timers.stop(rrc.t310);
        rrc.timers.set(rrc.t304, mob.t304_ms);
        rrc.timers.run(rrc.t304);

        ProcOutcome::Yield
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if !rrc.state().is_connected() {
            info!("handover interrupted, RRC is no longer connected");
            return ProcOutcome::Error;
        }
        if self.state == HoState::LaunchPhyCellSelect {
            let Some(mob) = self.mobility_info() else {
                return ProcOutcome::Error;
            };

            // reset and reestablish the stack towards the target cell
            rrc.pdcp.reestablish();
            rrc.rlc.reestablish();
            rrc.mac.wait_uplink();
            rrc.mac.clear_rntis();
            rrc.mac.reset();
            rrc.phy_ctrl.reset();

            rrc.mac.set_ho_rnti(mob.new_ue_id, mob.target_pci);

            // apply the common configuration, deferring the lower-layer push
            // when a dedicated configuration follows
            let send_lower_layers = !self.recfg.rr_cfg_ded_present;
            rrc.apply_rr_config_common(&mob.rr_cfg_common, send_lower_layers);
            if self.recfg.rr_cfg_ded_present {
                rrc.apply_rr_config_dedicated();
            }

            let Some(target) = rrc
                .meas_cells
                .get_neighbour(self.target_earfcn, mob.target_pci)
                .map(|c| c.phy_cell())
            else {
                error!("target cell disappeared before selection");
                return ProcOutcome::Error;
            };

            info!(cell = %target, "starting selection of the target cell");
            let generation = rrc.procs.ho_handler.generation();
            if !rrc
                .phy_ctrl
                .start_cell_select(target, PhySubscriber::Handover, generation)
            {
                error!(cell = %target, "failed to launch the target cell selection");
                return ProcOutcome::Error;
            }
            self.state = HoState::WaitPhyCellSelectComplete;
        }
        ProcOutcome::Yield
    }

    fn react(&mut self, rrc: &mut Rrc, event: HandoverEvent) -> ProcOutcome {
        match event {
            HandoverEvent::CellSelectResult(cs_ret) => {
                self.handle_cell_select_result(rrc, cs_ret)
            }
            HandoverEvent::T304Expiry => {
                info!("handover preparation timed out");
                ProcOutcome::Error
            }
            HandoverEvent::RaCompleted(success) => {
                if self.state != HoState::WaitRaCompletion {
                    warn!("unexpected RA completion event");
                    return ProcOutcome::Yield;
                }
                if success {
                    // reconfigure measurements relative to the source cell
                    if !rrc.parse_meas_config(&self.recfg, self.ho_src_cell.earfcn) {
                        error!("failed to parse the measurement configuration");
                    }
                }
                info!(success, "handover random access completed");
                if success {
                    ProcOutcome::Success
                } else {
                    ProcOutcome::Error
                }
            }
        }
    }

    fn output(&self) -> Self::Output {}

    fn then(&mut self, rrc: &mut Rrc, result: &ProcResult<()>) {
        info!(
            success = result.is_success(),
            "finished handover preparation"
        );
        if result.is_success() {
            rrc.timers.stop(rrc.t304);
        } else if rrc.timers.is_running(rrc.t304) {
            info!(
                src_cell = %self.ho_src_cell,
                src_rnti = self.ho_src_rnti,
                "waiting for T304 expiry to start the reestablishment"
            );
        }
    }
}
