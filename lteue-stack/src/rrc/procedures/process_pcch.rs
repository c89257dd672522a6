//! PCCH processing procedure
//!
//! Walks the paging records of a decoded Paging message, starting the NAS
//! paging response for records matching the UE identity, and refreshes all
//! system information of the serving cell when the message carries a
//! systemInfoModification.

use tracing::{error, info, warn};

use crate::messages::Paging;
use crate::proc::{self, ProcFuture, ProcOutcome, Procedure};
use crate::rrc::{serv_cell_cfg_slot, Rrc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PcchState {
    #[default]
    NextRecord,
    NasPaging,
    ServCellCfg,
}

/// PCCH processing procedure state.
#[derive(Default)]
pub struct ProcessPcchProc {
    paging: Paging,
    record_idx: usize,
    state: PcchState,
    serv_cfg_fut: ProcFuture<()>,
}

impl ProcessPcchProc {
    fn process_next_record(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        while self.record_idx < self.paging.paging_records.len() {
            let s_tmsi = self.paging.paging_records[self.record_idx].s_tmsi;
            info!(
                record = self.record_idx + 1,
                records = self.paging.paging_records.len(),
                %s_tmsi,
                "processing paging record"
            );
            if rrc.ue_identity == Some(s_tmsi) {
                if rrc.state().is_idle() {
                    info!("S-TMSI match in paging message");
                    if !rrc.nas.paging(&s_tmsi) {
                        error!("unable to start the NAS paging procedure");
                        return ProcOutcome::Error;
                    }
                    self.state = PcchState::NasPaging;
                    return ProcOutcome::Yield;
                }
                warn!("received paging while connected");
            } else {
                info!("received paging for an unknown identity");
            }
            self.record_idx += 1;
        }

        if self.paging.sys_info_mod {
            info!("system information modification notified, refreshing SIBs");
            rrc.meas_cells.serving_cell_mut().reset_sibs();
            let required_sibs = rrc.cfg.required_sibs.clone();
            match proc::launch(rrc, serv_cell_cfg_slot, required_sibs) {
                Ok(future) => {
                    self.serv_cfg_fut = future;
                    self.state = PcchState::ServCellCfg;
                    self.step_serv_cell_cfg(rrc)
                }
                Err(_) => {
                    error!("failed to initiate the serving cell configuration");
                    ProcOutcome::Error
                }
            }
        } else {
            info!("paging processed successfully");
            ProcOutcome::Success
        }
    }

    fn step_serv_cell_cfg(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        if proc::run(rrc, serv_cell_cfg_slot) {
            return ProcOutcome::Yield;
        }
        if self.serv_cfg_fut.is_success() {
            info!("all SIBs of the serving cell obtained successfully");
            ProcOutcome::Success
        } else {
            error!("failed to re-acquire the SIBs of the serving cell");
            ProcOutcome::Error
        }
    }
}

impl Procedure for ProcessPcchProc {
    type Context = Rrc;
    type Args = Paging;
    type Event = bool;
    type Output = ();

    const NAME: &'static str = "Process PCCH";

    fn init(&mut self, rrc: &mut Rrc, paging: Paging) -> ProcOutcome {
        self.paging = paging;
        self.record_idx = 0;
        self.state = PcchState::NextRecord;
        self.serv_cfg_fut = ProcFuture::detached();
        info!(
            records = self.paging.paging_records.len(),
            sys_info_mod = self.paging.sys_info_mod,
            "processing paging message"
        );
        self.process_next_record(rrc)
    }

    fn step(&mut self, rrc: &mut Rrc) -> ProcOutcome {
        match self.state {
            PcchState::NextRecord => self.process_next_record(rrc),
            // waiting for the NAS paging outcome
            PcchState::NasPaging => ProcOutcome::Yield,
            PcchState::ServCellCfg => self.step_serv_cell_cfg(rrc),
        }
    }

    fn react(&mut self, rrc: &mut Rrc, paging_ok: bool) -> ProcOutcome {
        if self.state != PcchState::NasPaging {
            warn!("unexpected paging complete event");
            return ProcOutcome::Yield;
        }
        if !paging_ok {
            info!("NAS paging failed");
            return ProcOutcome::Error;
        }
        info!("NAS paging completed");
        self.record_idx += 1;
        self.state = PcchState::NextRecord;
        self.process_next_record(rrc)
    }

    fn output(&self) -> Self::Output {}
}
