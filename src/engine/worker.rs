use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::{Shared, WorkerCommand, WorkerReport};
use crate::grid::BlockIndex;
use crate::solver::{update_block_full, update_block_seam};

/// One pool thread. Sleeps on the dispatch channel, drains the shared block
/// cursor when released, reports back, repeats until shutdown.
pub(crate) struct Worker {
    shared: Arc<Shared>,
    work_rx: Receiver<WorkerCommand>,
    report_tx: Sender<WorkerReport>,
    id: usize,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        work_rx: Receiver<WorkerCommand>,
        report_tx: Sender<WorkerReport>,
        id: usize,
    ) -> Self {
        Self {
            shared,
            work_rx,
            report_tx,
            id,
        }
    }

    pub(crate) fn run(self) {
        loop {
            match self.work_rx.recv() {
                Ok(WorkerCommand::Dispatch) => {
                    let report = self.run_cycle();
                    if self.report_tx.send(report).is_err() {
                        break;
                    }
                }
                Ok(WorkerCommand::Shutdown) | Err(_) => break,
            }
        }
        log::debug!("[Worker {}] exiting", self.id);
    }

    /// Claims blocks until the cursor runs past the arena. The activity flag
    /// is read without locks: only the coordinator rewrites it, and never
    /// while a cycle is in flight.
    fn run_cycle(&self) -> WorkerReport {
        let grid = &self.shared.grid;
        let front = grid.front_view();
        let meta = grid.meta_view();
        let total = grid.block_count();
        let mut report = WorkerReport::default();

        loop {
            let index = self.shared.cursor.fetch_add(1, Ordering::Relaxed);
            if index >= total {
                break;
            }
            let block = BlockIndex(index);
            let state = grid.block(block);
            let mut writer = grid.back_writer(block);

            let outcome = if state.is_active() {
                report.blocks_full += 1;
                update_block_full(&front, &meta, &mut writer)
            } else {
                report.blocks_seam += 1;
                update_block_seam(grid, block, &front, &meta, &mut writer)
            };

            state.set_frame_change(outcome.change);
            if outcome.wake {
                state.request_wake();
            }
        }
        report
    }
}
