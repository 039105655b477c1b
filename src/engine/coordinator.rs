use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use super::{FrameCommand, FrameStats, Shared, WorkerCommand, WorkerReport};
use crate::constants::activity::{DEACTIVATE_THRESHOLD, NEIGHBOR_CHANGE_BLEED};
use crate::grid::BlockIndex;
use crate::terrain;

/// The frame loop: sync pending terrain, run one worker barrier over all
/// blocks, apply activity transitions, publish completion.
///
/// The coordinator is the only thread that ever mutates block activity, and
/// it does so strictly between dispatch cycles; that is what lets workers
/// read the flags without locks.
pub(crate) struct Coordinator {
    shared: Arc<Shared>,
    frame_rx: Receiver<FrameCommand>,
    done_tx: Sender<FrameStats>,
    work_tx: Sender<WorkerCommand>,
    report_rx: Receiver<WorkerReport>,
    worker_count: usize,
}

impl Coordinator {
    pub(crate) fn new(
        shared: Arc<Shared>,
        frame_rx: Receiver<FrameCommand>,
        done_tx: Sender<FrameStats>,
        work_tx: Sender<WorkerCommand>,
        report_rx: Receiver<WorkerReport>,
        worker_count: usize,
    ) -> Self {
        Self {
            shared,
            frame_rx,
            done_tx,
            work_tx,
            report_rx,
            worker_count,
        }
    }

    pub(crate) fn run(self) {
        log::debug!("[Coordinator] entering frame loop");
        loop {
            match self.frame_rx.recv() {
                Ok(FrameCommand::Run) => self.run_frame(),
                Ok(FrameCommand::Shutdown) | Err(_) => break,
            }
        }
        for _ in 0..self.worker_count {
            if self.work_tx.send(WorkerCommand::Shutdown).is_err() {
                break;
            }
        }
        log::debug!("[Coordinator] stopped");
    }

    fn run_frame(&self) {
        let start = Instant::now();
        let woken_by_terrain = self.sync_terrain();
        let (blocks_full, blocks_seam) = self.dispatch_workers();
        let (woken, deactivated) = self.apply_activity();

        let stats = FrameStats {
            blocks_full,
            blocks_seam,
            blocks_woken: woken + woken_by_terrain,
            blocks_deactivated: deactivated,
            frame_time: start.elapsed(),
        };
        if self.done_tx.try_send(stats).is_err() {
            log::warn!("[Coordinator] frame completion dropped: caller skipped wait_for_frame");
        }
    }

    /// Drains the pending dirty rectangle into cell metadata under the
    /// terrain read lock. Runs before dispatch, so workers never observe a
    /// half-synced frame.
    fn sync_terrain(&self) -> usize {
        let pending = self.shared.pending_terrain.lock().take();
        let Some(rect) = pending else { return 0 };
        let field = self.shared.terrain.read();
        let woken = terrain::sync_rect(&self.shared.grid, &field, rect);
        log::debug!("[Coordinator] terrain sync {rect:?} woke {woken} blocks");
        woken
    }

    /// One bulk-synchronous barrier: every worker starts, the cursor hands
    /// each block to exactly one of them, and nothing proceeds until every
    /// worker has reported back.
    fn dispatch_workers(&self) -> (usize, usize) {
        self.shared.cursor.store(0, Ordering::Relaxed);
        for _ in 0..self.worker_count {
            self.work_tx
                .send(WorkerCommand::Dispatch)
                .expect("worker pool gone");
        }

        let mut blocks_full = 0;
        let mut blocks_seam = 0;
        for _ in 0..self.worker_count {
            let report = self.report_rx.recv().expect("worker pool gone");
            blocks_full += report.blocks_full;
            blocks_seam += report.blocks_seam;
        }
        (blocks_full, blocks_seam)
    }

    /// Applies deactivation and wake decisions from this frame's per-block
    /// reports. Neighbor contributions read a snapshot taken before any
    /// state is rewritten, so the decisions are order-independent.
    fn apply_activity(&self) -> (usize, usize) {
        let grid = &self.shared.grid;
        let bpa = grid.blocks_per_axis();
        let snapshot: Vec<(bool, f32)> = (0..grid.block_count())
            .map(|i| {
                let state = grid.block(BlockIndex(i));
                (state.is_active(), state.change())
            })
            .collect();

        let mut woken = 0;
        let mut deactivated = 0;
        for by in 0..bpa {
            for bx in 0..bpa {
                let index = by * bpa + bx;
                let state = grid.block(BlockIndex(index));
                let own = state.frame_change();

                let mut bleed = 0.0f32;
                let mut fold = |nbx: usize, nby: usize| {
                    let (active, change) = snapshot[nby * bpa + nbx];
                    if active {
                        bleed = bleed.max(change);
                    }
                };
                if bx > 0 {
                    fold(bx - 1, by);
                }
                if bx + 1 < bpa {
                    fold(bx + 1, by);
                }
                if by > 0 {
                    fold(bx, by - 1);
                }
                if by + 1 < bpa {
                    fold(bx, by + 1);
                }

                let combined = own + NEIGHBOR_CHANGE_BLEED * bleed;
                let wake = state.take_wake();
                state.set_change(combined);

                if snapshot[index].0 {
                    if combined < DEACTIVATE_THRESHOLD && !wake {
                        state.set_active(false);
                        deactivated += 1;
                    }
                } else if wake {
                    state.set_active(true);
                    woken += 1;
                }
            }
        }
        if woken > 0 || deactivated > 0 {
            log::trace!("[Coordinator] activity: {woken} woken, {deactivated} deactivated");
        }
        (woken, deactivated)
    }
}
