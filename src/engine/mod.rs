//! The simulation engine: one coordinator thread plus a fixed worker pool
//! advancing the grid one frame per `start_frame`/`wait_for_frame` pair.
//!
//! Dispatch is message passing over bounded channels: the caller releases
//! the coordinator, the coordinator fans a dispatch message out to every
//! worker, workers drain the shared block cursor, and completion flows back
//! as one report per worker. A dispatched frame always runs to completion;
//! teardown only happens between frames.

mod coordinator;
mod worker;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::constants::engine::MIN_WORKERS;
use crate::grid::{FrontView, Grid, GridConfigError};
use crate::terrain::{self, CellRect, HeightField};
use coordinator::Coordinator;
use worker::Worker;

/// Commands on the caller-to-coordinator channel.
pub(crate) enum FrameCommand {
    Run,
    Shutdown,
}

/// Commands on the coordinator-to-worker channel.
pub(crate) enum WorkerCommand {
    Dispatch,
    Shutdown,
}

/// Per-cycle completion report from one worker.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct WorkerReport {
    pub blocks_full: usize,
    pub blocks_seam: usize,
}

/// What one frame cost, readable between frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    /// Blocks that ran the full update path
    pub blocks_full: usize,
    /// Blocks that ran the seam-only check
    pub blocks_seam: usize,
    /// Blocks activated this frame (terrain sync + seam wakes)
    pub blocks_woken: usize,
    /// Blocks that went dormant this frame
    pub blocks_deactivated: usize,
    pub frame_time: Duration,
}

/// State shared between the caller, the coordinator, and the workers.
pub(crate) struct Shared {
    pub grid: Grid,
    pub terrain: Arc<RwLock<HeightField>>,
    pub pending_terrain: Mutex<Option<CellRect>>,
    /// Flat block cursor workers claim from. Relaxed ordering is deliberate:
    /// the channel handoffs around each cycle publish everything else, and
    /// claiming only needs uniqueness.
    pub cursor: AtomicUsize,
}

/// Double-buffered cellular fluid simulation over a terrain height field.
///
/// The caller drives frames with `start_frame` (non-blocking) followed by
/// `wait_for_frame` (blocking), and may read the front plane only between a
/// completed `wait_for_frame` and the next `start_frame`. Dropping the
/// engine joins every thread before any owned state is torn down.
pub struct SimulationEngine {
    shared: Arc<Shared>,
    frame_tx: Sender<FrameCommand>,
    done_rx: Receiver<FrameStats>,
    last_stats: Mutex<FrameStats>,
    coordinator: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl SimulationEngine {
    /// Builds an engine over the terrain with a dry grid.
    pub fn new(terrain: Arc<RwLock<HeightField>>) -> Result<Self, GridConfigError> {
        Self::with_initial_fluid(terrain, 0.0)
    }

    /// Builds an engine whose grid starts at a uniform fluid height.
    ///
    /// The grid side is taken from the terrain field and must be a multiple
    /// of the block size; anything else is a fatal configuration error.
    pub fn with_initial_fluid(
        terrain: Arc<RwLock<HeightField>>,
        fluid_height: f32,
    ) -> Result<Self, GridConfigError> {
        let cells_per_axis = terrain.read().cells_per_axis();
        let grid = Grid::new(cells_per_axis, fluid_height)?;

        let shared = Arc::new(Shared {
            grid,
            terrain,
            pending_terrain: Mutex::new(None),
            cursor: AtomicUsize::new(0),
        });

        // Seed terrain metadata before any thread can observe the grid.
        {
            let field = shared.terrain.read();
            terrain::sync_rect(&shared.grid, &field, CellRect::full(cells_per_axis));
        }

        let worker_count = num_cpus::get().max(MIN_WORKERS);
        let (frame_tx, frame_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let (work_tx, work_rx) = bounded(worker_count);
        let (report_tx, report_rx) = bounded(worker_count);

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let worker = Worker::new(
                Arc::clone(&shared),
                work_rx.clone(),
                report_tx.clone(),
                id,
            );
            let handle = thread::Builder::new()
                .name(format!("flowgrid-worker-{id}"))
                .spawn(move || worker.run())
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        let coordinator = Coordinator::new(
            Arc::clone(&shared),
            frame_rx,
            done_tx,
            work_tx,
            report_rx,
            worker_count,
        );
        let coordinator = thread::Builder::new()
            .name("flowgrid-coordinator".into())
            .spawn(move || coordinator.run())
            .expect("failed to spawn coordinator thread");

        log::info!(
            "[SimulationEngine] {0}x{0} cells, {1} blocks, {2} workers",
            cells_per_axis,
            shared.grid.block_count(),
            worker_count
        );

        Ok(Self {
            shared,
            frame_tx,
            done_rx,
            last_stats: Mutex::new(FrameStats::default()),
            coordinator: Some(coordinator),
            workers,
            worker_count,
        })
    }

    /// Begins a frame: publishes last frame's results by swapping planes and
    /// releases the coordinator. Non-blocking. Every `start_frame` must be
    /// matched by a `wait_for_frame` before the next one.
    pub fn start_frame(&self) {
        self.shared.grid.swap_active_planes();
        self.frame_tx
            .send(FrameCommand::Run)
            .expect("coordinator thread gone");
    }

    /// Blocks until the frame begun by the last `start_frame` completes.
    pub fn wait_for_frame(&self) -> FrameStats {
        let stats = self.done_rx.recv().expect("coordinator thread gone");
        *self.last_stats.lock() = stats;
        stats
    }

    /// Records a dirty terrain rectangle for the coordinator to sync before
    /// the next frame. Non-blocking; rectangles coalesce by union.
    pub fn terrain_update(&self, rect: CellRect) {
        let mut pending = self.shared.pending_terrain.lock();
        *pending = Some(match *pending {
            Some(existing) => existing.union(rect),
            None => rect,
        });
    }

    /// Maps a source (or sink) onto one cell and keeps its block awake.
    /// Call only between frames; a zero capacity removes the source.
    pub fn set_source(&self, x: usize, y: usize, source_height: f32, source_capacity: f32) {
        {
            let mut meta = self.shared.grid.meta_mut();
            let index = self.shared.grid.cell_index(x, y);
            meta[index].source_height = source_height;
            meta[index].source_capacity = source_capacity.max(0.0);
        }
        let block = self.shared.grid.block_for_cell(x, y);
        self.shared.grid.block(block).set_active(true);
    }

    /// Read handle onto the published plane. Valid between a completed
    /// `wait_for_frame` and the next `start_frame`.
    pub fn front(&self) -> FrontView<'_> {
        self.shared.grid.front_view()
    }

    pub fn last_frame_stats(&self) -> FrameStats {
        *self.last_stats.lock()
    }

    pub fn block_is_active(&self, bx: usize, by: usize) -> bool {
        self.shared.grid.block_at(bx, by).is_active()
    }

    pub fn cells_per_axis(&self) -> usize {
        self.shared.grid.cells_per_axis()
    }

    pub fn blocks_per_axis(&self) -> usize {
        self.shared.grid.blocks_per_axis()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        log::debug!("[SimulationEngine] shutting down");
        // The coordinator forwards shutdown to the pool; join it first so
        // no dispatch is in flight while workers wind down.
        let _ = self.frame_tx.send(FrameCommand::Shutdown);
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
