//! Double-buffered cell storage partitioned into scheduling blocks.
//!
//! The two cell planes are flat arenas selected by an atomic front index.
//! A swap flips the index and bumps a generation counter; no cell data is
//! ever copied. External readers go through [`FrontView`] handles that carry
//! the generation they were minted at, and back-plane writes go through
//! per-block [`BlockWriter`] handles, so the single-writer frame discipline
//! is visible in the types rather than implied by comments.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::block::{BlockIndex, BlockState};
use super::cell::{Cell, CellMeta};
use crate::constants::grid::BLOCK_SIZE;

/// Grid construction failures. Configuration errors are fatal: there is no
/// degraded mode for a grid whose blocks do not tile it.
#[derive(Debug, thiserror::Error)]
pub enum GridConfigError {
    #[error("grid side {cells_per_axis} is not a multiple of block size {block_size}")]
    UnalignedGrid {
        cells_per_axis: usize,
        block_size: usize,
    },

    #[error("grid side must be at least one block, got {cells_per_axis} cells")]
    GridTooSmall { cells_per_axis: usize },
}

/// One flat arena of cells.
///
/// During a dispatch cycle the back plane is written only through per-block
/// `BlockWriter` handles (block claims are unique, so every cell has at most
/// one writer) and the front plane is not written at all; between cycles
/// only the caller thread touches either plane. That protocol is what makes
/// the `Sync` impl sound.
struct CellPlane {
    cells: Box<[UnsafeCell<Cell>]>,
}

unsafe impl Sync for CellPlane {}

impl CellPlane {
    fn filled(len: usize, cell: Cell) -> Self {
        Self {
            cells: (0..len).map(|_| UnsafeCell::new(cell)).collect(),
        }
    }

    fn get(&self, index: usize) -> Cell {
        // Sound while no writer holds this index; see the Sync contract.
        unsafe { *self.cells[index].get() }
    }

    fn set(&self, index: usize, cell: Cell) {
        // Callers reach this only through BlockWriter, which asserts the
        // index lies inside the claimed block.
        unsafe {
            *self.cells[index].get() = cell;
        }
    }
}

/// Owns all cells (front and back planes), per-cell metadata, and per-block
/// scheduling state. The grid size is fixed for the engine's lifetime.
pub struct Grid {
    planes: [CellPlane; 2],
    /// Index of the published (front) plane; flipped by `swap_active_planes`
    front: AtomicUsize,
    /// Bumped on every swap; `FrontView` handles carry the value they saw
    generation: AtomicU64,
    meta: RwLock<Box<[CellMeta]>>,
    blocks: Box<[BlockState]>,
    cells_per_axis: usize,
    blocks_per_axis: usize,
}

impl Grid {
    pub fn new(cells_per_axis: usize, initial_height: f32) -> Result<Self, GridConfigError> {
        if cells_per_axis < BLOCK_SIZE {
            return Err(GridConfigError::GridTooSmall { cells_per_axis });
        }
        if cells_per_axis % BLOCK_SIZE != 0 {
            return Err(GridConfigError::UnalignedGrid {
                cells_per_axis,
                block_size: BLOCK_SIZE,
            });
        }

        let cell_count = cells_per_axis * cells_per_axis;
        let blocks_per_axis = cells_per_axis / BLOCK_SIZE;
        let block_count = blocks_per_axis * blocks_per_axis;
        let initial = Cell::with_height(initial_height.max(0.0));

        Ok(Self {
            planes: [
                CellPlane::filled(cell_count, initial),
                CellPlane::filled(cell_count, initial),
            ],
            front: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            meta: RwLock::new(vec![CellMeta::default(); cell_count].into_boxed_slice()),
            blocks: (0..block_count).map(|_| BlockState::new()).collect(),
            cells_per_axis,
            blocks_per_axis,
        })
    }

    pub fn cells_per_axis(&self) -> usize {
        self.cells_per_axis
    }

    pub fn blocks_per_axis(&self) -> usize {
        self.blocks_per_axis
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn cell_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.cells_per_axis && y < self.cells_per_axis);
        y * self.cells_per_axis + x
    }

    pub fn block_for_cell(&self, x: usize, y: usize) -> BlockIndex {
        debug_assert!(x < self.cells_per_axis && y < self.cells_per_axis);
        BlockIndex((y / BLOCK_SIZE) * self.blocks_per_axis + x / BLOCK_SIZE)
    }

    pub fn block(&self, index: BlockIndex) -> &BlockState {
        &self.blocks[index.0]
    }

    pub fn block_at(&self, bx: usize, by: usize) -> &BlockState {
        debug_assert!(bx < self.blocks_per_axis && by < self.blocks_per_axis);
        &self.blocks[by * self.blocks_per_axis + bx]
    }

    pub fn block_coords(&self, index: BlockIndex) -> (usize, usize) {
        (index.0 % self.blocks_per_axis, index.0 / self.blocks_per_axis)
    }

    /// Published-plane read. Convenience for single lookups; bulk readers
    /// should hold a [`FrontView`].
    pub fn cell_front(&self, x: usize, y: usize) -> Cell {
        let front = self.front.load(Ordering::Relaxed);
        self.planes[front].get(self.cell_index(x, y))
    }

    /// Back-plane read. Coordinator-side diagnostics only; worthless to
    /// external readers mid-frame.
    pub fn cell_back(&self, x: usize, y: usize) -> Cell {
        let back = self.front.load(Ordering::Relaxed) ^ 1;
        self.planes[back].get(self.cell_index(x, y))
    }

    pub fn cell_meta(&self, x: usize, y: usize) -> CellMeta {
        self.meta.read()[self.cell_index(x, y)]
    }

    /// Shared metadata view for a whole dispatch cycle. Workers take one
    /// guard per cycle instead of locking per cell.
    pub fn meta_view(&self) -> MetaView<'_> {
        MetaView {
            guard: self.meta.read(),
            cells_per_axis: self.cells_per_axis,
        }
    }

    /// Exclusive metadata access for the terrain bridge and source mapping.
    /// Blocks until no worker holds a cycle-long read guard.
    pub fn meta_mut(&self) -> RwLockWriteGuard<'_, Box<[CellMeta]>> {
        self.meta.write()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Exchanges front and back planes by index flip and invalidates every
    /// outstanding `FrontView`. Called exactly once per frame, only while no
    /// worker is running.
    pub fn swap_active_planes(&self) {
        self.front.fetch_xor(1, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Read handle onto the published plane at the current generation.
    pub fn front_view(&self) -> FrontView<'_> {
        FrontView {
            grid: self,
            plane: self.front.load(Ordering::Relaxed),
            generation: self.generation(),
        }
    }

    /// Write handle for one claimed block's back-plane cells.
    ///
    /// The dispatch cursor guarantees each block index is claimed exactly
    /// once per cycle, which makes the minted writer the unique writer of
    /// those cells until the next swap.
    pub fn back_writer(&self, block: BlockIndex) -> BlockWriter<'_> {
        debug_assert!(block.0 < self.blocks.len());
        let (bx, by) = self.block_coords(block);
        BlockWriter {
            grid: self,
            plane: self.front.load(Ordering::Relaxed) ^ 1,
            x0: bx * BLOCK_SIZE,
            y0: by * BLOCK_SIZE,
        }
    }
}

/// Read-only view of the published plane.
///
/// Carries the generation observed at creation; using a view across a swap
/// is a protocol violation, detectable through [`FrontView::is_current`] and
/// debug-asserted on access.
pub struct FrontView<'g> {
    grid: &'g Grid,
    plane: usize,
    generation: u64,
}

impl FrontView<'_> {
    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> Cell {
        debug_assert!(self.is_current(), "front view used across a plane swap");
        self.grid.planes[self.plane].get(self.grid.cell_index(x, y))
    }

    pub fn cells_per_axis(&self) -> usize {
        self.grid.cells_per_axis
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.generation == self.grid.generation()
    }

    /// Total fluid volume over the published plane.
    pub fn total_volume(&self) -> f64 {
        let n = self.grid.cells_per_axis;
        let mut total = 0.0f64;
        for y in 0..n {
            for x in 0..n {
                total += f64::from(self.cell(x, y).fluid_height);
            }
        }
        total
    }
}

/// Cycle-long read guard over cell metadata.
pub struct MetaView<'g> {
    guard: RwLockReadGuard<'g, Box<[CellMeta]>>,
    cells_per_axis: usize,
}

impl MetaView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> CellMeta {
        debug_assert!(x < self.cells_per_axis && y < self.cells_per_axis);
        self.guard[y * self.cells_per_axis + x]
    }
}

/// Unique write handle for one block's back-plane cells during a dispatch
/// cycle.
pub struct BlockWriter<'g> {
    grid: &'g Grid,
    plane: usize,
    x0: usize,
    y0: usize,
}

impl BlockWriter<'_> {
    /// Inclusive-exclusive cell bounds of the claimed block.
    pub fn bounds(&self) -> (usize, usize, usize, usize) {
        (
            self.x0,
            self.y0,
            self.x0 + BLOCK_SIZE,
            self.y0 + BLOCK_SIZE,
        )
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x0 + BLOCK_SIZE && y >= self.y0 && y < self.y0 + BLOCK_SIZE
    }

    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        assert!(self.contains(x, y), "write outside claimed block");
        self.grid.planes[self.plane].set(self.grid.cell_index(x, y), cell);
    }
}
