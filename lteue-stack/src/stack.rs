//! UE stack surface
//!
//! Owns the RRC engine and the stack-thread scheduling discipline: all
//! engine work executes on one thread, fed by a bounded multi-producer task
//! queue with per-producer sub-queues (UE control, PHY sync, GW, MAC,
//! background results). `run_tti` submits a single task that runs, in order,
//! the MAC tick, the RRC tick and the timer step.
//!
//! Cross-thread producers use a [`UeStackHandle`]; the owning thread drives
//! the stack with [`UeStack::run`] (or [`UeStack::process_pending_tasks`]
//! and [`UeStack::run_tti_direct`] when embedded in a caller-owned loop).

use bytes::Bytes;
use tracing::{debug, info, warn};

use lteue_common::config::UeConfig;
use lteue_common::error::Error;

use crate::interfaces::{
    CellSearchResult, GwInterface, MacInterface, NasInterface, PdcpInterface, PdnType,
    PhyInterface, RlcInterface, RlcMetrics, UsimInterface,
};
use crate::messages::SibMessage;
use crate::rrc::{Rrc, RrcMetrics};
use crate::task_queue::{BackgroundTask, BackgroundWorkerPool, TaskMultiQueue, TaskProducer};

/// Capacity of each stack sub-queue.
pub const STACK_QUEUE_CAPACITY: usize = 1024;

/// Number of background worker threads for CPU-heavy offloads.
pub const NOF_BACKGROUND_WORKERS: u32 = 2;

/// A closure executed on the stack thread.
pub type StackTask = Box<dyn FnOnce(&mut UeStack) + Send>;

/// Aggregated stack metrics.
#[derive(Debug, Clone)]
pub struct StackMetrics {
    pub rrc: RrcMetrics,
    pub rlc: RlcMetrics,
}

/// Cross-thread producer surface of the stack.
#[derive(Clone)]
pub struct UeStackHandle {
    ue_queue: TaskProducer<StackTask>,
    sync_queue: TaskProducer<StackTask>,
    gw_queue: TaskProducer<StackTask>,
    mac_queue: TaskProducer<StackTask>,
    background_queue: TaskProducer<StackTask>,
}

impl UeStackHandle {
    /// PHY sync thread: one scheduler turn for this TTI.
    pub fn run_tti(&self, tti: u32) {
        self.sync_queue
            .push(Box::new(move |stack| stack.run_tti_direct(tti)));
    }

    /// PHY sync thread: the PHY is synchronized.
    pub fn in_sync(&self) {
        self.sync_queue.push(Box::new(|stack| stack.rrc.in_sync()));
    }

    /// PHY sync thread: the PHY lost synchronization.
    pub fn out_of_sync(&self) {
        self.sync_queue
            .push(Box::new(|stack| stack.rrc.out_of_sync()));
    }

    /// GW: submit an uplink SDU. Dropped with a warning when the GW
    /// sub-queue is full.
    pub fn write_sdu(&self, lcid: u32, pdu: Bytes, blocking: bool) {
        let accepted = self
            .gw_queue
            .try_push(Box::new(move |stack| stack.write_sdu(lcid, pdu, blocking)));
        if !accepted {
            warn!(lcid, "GW SDU discarded");
        }
    }

    /// PHY: a cell search completed.
    pub fn cell_search_completed(&self, result: CellSearchResult) {
        self.ue_queue
            .push(Box::new(move |stack| stack.rrc.cell_search_completed(result)));
    }

    /// PHY: a cell selection completed.
    pub fn cell_select_completed(&self, cs_ret: bool) {
        self.ue_queue
            .push(Box::new(move |stack| stack.rrc.cell_select_completed(cs_ret)));
    }

    /// MAC: random access completed.
    pub fn ra_completed(&self, success: bool) {
        self.mac_queue
            .push(Box::new(move |stack| stack.rrc.ra_completed(success)));
    }

    /// MAC: a decoded system information block arrived.
    pub fn sib_received(&self, sib: SibMessage) {
        self.mac_queue
            .push(Box::new(move |stack| stack.rrc.handle_sib(sib)));
    }

    /// NAS: the paging response procedure finished.
    pub fn paging_complete(&self, ok: bool) {
        self.ue_queue
            .push(Box::new(move |stack| stack.rrc.paging_complete(ok)));
    }

    /// Background worker: post a completion back onto the stack thread.
    pub fn notify_background_task_result(&self, task: StackTask) {
        self.background_queue.push(task);
    }

    /// Runs an arbitrary closure on the stack thread.
    pub fn defer_task(&self, task: StackTask) {
        self.ue_queue.push(task);
    }

    /// Stops the stack loop.
    pub fn stop(&self) {
        self.ue_queue.push(Box::new(|stack| stack.stop_impl()));
    }
}

/// The UE stack: RRC engine plus scheduling and offload plumbing.
pub struct UeStack {
    rrc: Rrc,
    gw: Box<dyn GwInterface>,
    pending_tasks: TaskMultiQueue<StackTask>,
    handle: UeStackHandle,
    background_tasks: BackgroundWorkerPool,
    deferred_stack_tasks: Vec<StackTask>,
    running: bool,
}

impl UeStack {
    /// Builds the stack around its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: UeConfig,
        phy: Box<dyn PhyInterface>,
        mac: Box<dyn MacInterface>,
        rlc: Box<dyn RlcInterface>,
        pdcp: Box<dyn PdcpInterface>,
        nas: Box<dyn NasInterface>,
        usim: Box<dyn UsimInterface>,
        gw: Box<dyn GwInterface>,
    ) -> Result<Self, Error> {
        cfg.validate()?;

        let mut pending_tasks = TaskMultiQueue::new();
        let handle = UeStackHandle {
            ue_queue: pending_tasks.add_queue("ue", STACK_QUEUE_CAPACITY),
            sync_queue: pending_tasks.add_queue("sync", STACK_QUEUE_CAPACITY),
            gw_queue: pending_tasks.add_queue("gw", STACK_QUEUE_CAPACITY),
            mac_queue: pending_tasks.add_queue("mac", STACK_QUEUE_CAPACITY),
            background_queue: pending_tasks.add_queue("background", STACK_QUEUE_CAPACITY),
        };

        let rrc = Rrc::new(cfg, phy, mac, rlc, pdcp, nas, usim);

        Ok(Self {
            rrc,
            gw,
            pending_tasks,
            handle,
            background_tasks: BackgroundWorkerPool::new(
                NOF_BACKGROUND_WORKERS,
                STACK_QUEUE_CAPACITY,
            ),
            deferred_stack_tasks: Vec::new(),
            running: true,
        })
    }

    /// Cross-thread producer handle.
    pub fn handle(&self) -> UeStackHandle {
        self.handle.clone()
    }

    /// The RRC engine.
    pub fn rrc(&self) -> &Rrc {
        &self.rrc
    }

    /// Mutable access to the RRC engine.
    pub fn rrc_mut(&mut self) -> &mut Rrc {
        &mut self.rrc
    }

    // ========================================================================
    // Stack thread loop
    // ========================================================================

    /// Blocking stack-thread loop: `wait_pop -> execute` until stopped.
    pub fn run(&mut self) {
        info!("stack thread started");
        while self.running {
            match self.pending_tasks.wait_pop() {
                Some(task) => task(self),
                None => break,
            }
        }
        info!("stack thread stopped");
    }

    /// Drains currently queued tasks without blocking. Returns the number of
    /// tasks executed.
    pub fn process_pending_tasks(&mut self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.pending_tasks.try_pop() {
            task(self);
            executed += 1;
            if !self.running {
                break;
            }
        }
        executed
    }

    /// One scheduler turn: deferred tasks, MAC tick, RRC tick, timer step.
    pub fn run_tti_direct(&mut self, tti: u32) {
        for task in std::mem::take(&mut self.deferred_stack_tasks) {
            task(self);
        }
        self.rrc.mac.run_tti(tti);
        self.rrc.run_tti(tti);
        self.rrc.step_timers();
    }

    fn stop_impl(&mut self) {
        info!("stopping stack");
        self.running = false;
        self.rrc.rlc.stop();
        self.background_tasks.stop();
    }

    /// Requests a stop; effective once the current task finishes.
    pub fn stop(&mut self) {
        self.stop_impl();
    }

    // ========================================================================
    // Upward surface
    // ========================================================================

    /// Switches the UE on: starts the PLMN search.
    pub fn switch_on(&mut self) -> bool {
        info!("switch on");
        self.rrc.start_plmn_search();
        true
    }

    /// Switches the UE off: releases the connection.
    pub fn switch_off(&mut self) -> bool {
        info!("switch off");
        self.rrc.start_go_idle();
        true
    }

    /// Fills a metrics snapshot.
    pub fn get_metrics(&self, metrics: &mut StackMetrics) -> bool {
        metrics.rrc = self.rrc.get_metrics();
        metrics.rlc = self.rrc.rlc.get_metrics();
        true
    }

    /// Uplink SDU from the GW.
    pub fn write_sdu(&mut self, lcid: u32, pdu: Bytes, blocking: bool) {
        self.rrc.pdcp.write_sdu(lcid, pdu, blocking);
    }

    /// Configures the network interface address of a bearer.
    pub fn setup_bearer(
        &mut self,
        lcid: u32,
        pdn_type: PdnType,
        ipv4: Option<std::net::Ipv4Addr>,
        ipv6: Option<std::net::Ipv6Addr>,
    ) -> Result<(), Error> {
        self.gw.setup_if_addr(lcid, pdn_type, ipv4, ipv6)
    }

    /// Low-MAC request to search for a cell. Not wired on this stack.
    pub fn start_cell_search(&mut self) {
        debug!("low-MAC cell search request not implemented");
    }

    /// Low-MAC request to select a cell. Not wired on this stack.
    pub fn start_cell_select(&mut self, cell: lteue_common::types::PhyCell) {
        debug!(%cell, "low-MAC cell select request not implemented");
    }

    // ========================================================================
    // Task handling surface
    // ========================================================================

    /// Queues a CPU-heavy task on the background pool.
    pub fn enqueue_background_task(&self, task: BackgroundTask) -> bool {
        self.background_tasks.push_task(task)
    }

    /// Posts a background completion onto the stack thread.
    pub fn notify_background_task_result(&self, task: StackTask) {
        self.handle.notify_background_task_result(task);
    }

    /// Schedules a one-shot engine callback after `duration_ms`.
    pub fn defer_callback<F>(&mut self, duration_ms: u32, callback: F)
    where
        F: FnOnce(&mut Rrc) + Send + 'static,
    {
        self.rrc.timers.defer_callback(duration_ms, callback);
    }

    /// Defers a task to the start of the next scheduler turn.
    pub fn defer_task(&mut self, task: StackTask) {
        self.deferred_stack_tasks.push(task);
    }

    /// Current TTI as seen by the engine.
    pub fn get_current_tti(&self) -> u32 {
        self.rrc.current_tti
    }
}
