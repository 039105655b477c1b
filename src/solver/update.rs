//! Block update paths: the full per-cell recompute for active blocks and
//! the seam-only check for dormant ones.
//!
//! Both paths read the front plane and write the claimed block's back cells,
//! never anything else, so the worker pool can run them on any block mix
//! without coordination beyond the claim cursor.

use super::flow::{settle_source, solve_edge, EdgeSide};
use crate::constants::activity::REACTIVATE_THRESHOLD;
use crate::grid::{BlockIndex, BlockWriter, Cell, FrontView, Grid, MetaView};

/// What a block update wants the scheduler to know.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockOutcome {
    /// Mean absolute height delta over wet cells (full update) or summed
    /// seam difference (seam check)
    pub change: f32,
    /// The block must be awake next frame
    pub wake: bool,
}

struct CellStep {
    cell: Cell,
    delta_abs: f32,
    wet: bool,
    newly_wet: bool,
    clamped_negative: bool,
    has_source: bool,
}

/// Advances one cell: solves all four edges against front state, assembles
/// the new height, applies the negative clamp and any mapped source.
fn step_cell(x: usize, y: usize, front: &FrontView<'_>, meta: &MetaView<'_>) -> CellStep {
    let n = front.cells_per_axis();
    let cur = front.cell(x, y);
    let m = meta.get(x, y);
    let this = EdgeSide::new(&cur, &m);

    let mut delta = 0.0f32;
    let mut flow = [0.0f32; 2];

    // Owned edges toward -x / -y.
    if x > 0 {
        let nc = front.cell(x - 1, y);
        let nm = meta.get(x - 1, y);
        let result = solve_edge(this, EdgeSide::new(&nc, &nm), cur.flow[0], 1.0);
        flow[0] = result.stored;
        delta += result.height_delta;
    }
    if y > 0 {
        let nc = front.cell(x, y - 1);
        let nm = meta.get(x, y - 1);
        let result = solve_edge(this, EdgeSide::new(&nc, &nm), cur.flow[1], 1.0);
        flow[1] = result.stored;
        delta += result.height_delta;
    }

    // Neighbor-owned edges toward +x / +y, re-derived symmetrically.
    if x + 1 < n {
        let nc = front.cell(x + 1, y);
        let nm = meta.get(x + 1, y);
        let result = solve_edge(this, EdgeSide::new(&nc, &nm), nc.flow[0], -1.0);
        delta += result.height_delta;
    }
    if y + 1 < n {
        let nc = front.cell(x, y + 1);
        let nm = meta.get(x, y + 1);
        let result = solve_edge(this, EdgeSide::new(&nc, &nm), nc.flow[1], -1.0);
        delta += result.height_delta;
    }

    let raw = cur.fluid_height + delta;
    let clamped_negative = raw < 0.0;
    let height = settle_source(raw.max(0.0), &m);

    let next = Cell {
        fluid_height: height,
        flow,
    };
    CellStep {
        delta_abs: (next.fluid_height - cur.fluid_height).abs(),
        wet: cur.is_wet() || next.is_wet(),
        newly_wet: !cur.is_wet() && next.is_wet(),
        clamped_negative,
        has_source: m.has_source(),
        cell: next,
    }
}

/// Recomputes every cell of an active block. Returns the normalized change
/// metric; a mapped source keeps the block awake regardless of it.
pub fn update_block_full(
    front: &FrontView<'_>,
    meta: &MetaView<'_>,
    writer: &mut BlockWriter<'_>,
) -> BlockOutcome {
    let (x0, y0, x1, y1) = writer.bounds();
    let mut delta_sum = 0.0f32;
    let mut wet_cells = 0usize;
    let mut wake = false;

    for y in y0..y1 {
        for x in x0..x1 {
            let step = step_cell(x, y, front, meta);
            if step.wet {
                wet_cells += 1;
                delta_sum += step.delta_abs;
            }
            wake |= step.has_source;
            writer.set(x, y, step.cell);
        }
    }

    BlockOutcome {
        change: if wet_cells > 0 {
            delta_sum / wet_cells as f32
        } else {
            0.0
        },
        wake,
    }
}

/// Seam check for a dormant block: carries the tile forward and reruns the
/// solver only on boundary cells facing an active neighbor. A seam
/// difference above the reactivation threshold, a dry cell turning wet, or a
/// negative-height correction wakes the block for the next frame.
pub fn update_block_seam(
    grid: &Grid,
    block: BlockIndex,
    front: &FrontView<'_>,
    meta: &MetaView<'_>,
    writer: &mut BlockWriter<'_>,
) -> BlockOutcome {
    let (x0, y0, x1, y1) = writer.bounds();

    // Carry the tile forward so the plane is fully populated after the swap.
    for y in y0..y1 {
        for x in x0..x1 {
            writer.set(x, y, front.cell(x, y));
        }
    }

    let (bx, by) = grid.block_coords(block);
    let bpa = grid.blocks_per_axis();
    let west = bx > 0 && grid.block_at(bx - 1, by).is_active();
    let east = bx + 1 < bpa && grid.block_at(bx + 1, by).is_active();
    let south = by > 0 && grid.block_at(bx, by - 1).is_active();
    let north = by + 1 < bpa && grid.block_at(bx, by + 1).is_active();
    if !(west || east || south || north) {
        return BlockOutcome::default();
    }

    let mut seam_sum = 0.0f32;
    let mut wake = false;
    let mut seam_cell = |x: usize, y: usize| {
        let step = step_cell(x, y, front, meta);
        seam_sum += step.delta_abs;
        wake |= step.newly_wet || step.clamped_negative;
        writer.set(x, y, step.cell);
    };

    // Corner cells sit on two seams; trim the rows so each cell runs once.
    let row_x0 = if west { x0 + 1 } else { x0 };
    let row_x1 = if east { x1 - 1 } else { x1 };
    if west {
        for y in y0..y1 {
            seam_cell(x0, y);
        }
    }
    if east {
        for y in y0..y1 {
            seam_cell(x1 - 1, y);
        }
    }
    if south {
        for x in row_x0..row_x1 {
            seam_cell(x, y0);
        }
    }
    if north {
        for x in row_x0..row_x1 {
            seam_cell(x, y1 - 1);
        }
    }

    wake |= seam_sum > REACTIVATE_THRESHOLD;
    BlockOutcome {
        change: seam_sum,
        wake,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::grid::BLOCK_SIZE;
    use crate::grid::Grid;

    /// Builds a grid whose front plane holds `height` everywhere except the
    /// listed cells.
    fn seeded_grid(cells: usize, height: f32, bumps: &[(usize, usize, f32)]) -> Grid {
        let grid = Grid::new(cells, height).expect("grid");
        for &(x, y, h) in bumps {
            let block = grid.block_for_cell(x, y);
            let mut writer = grid.back_writer(block);
            writer.set(x, y, Cell::with_height(h));
        }
        grid.swap_active_planes();
        grid
    }

    fn back_volume(grid: &Grid) -> f64 {
        let n = grid.cells_per_axis();
        let mut total = 0.0f64;
        for y in 0..n {
            for x in 0..n {
                total += f64::from(grid.cell_back(x, y).fluid_height);
            }
        }
        total
    }

    #[test]
    fn full_update_conserves_and_levels_a_bump() {
        let grid = seeded_grid(BLOCK_SIZE, 1.0, &[(8, 8, 3.0)]);
        let front = grid.front_view();
        let meta = grid.meta_view();
        let mut writer = grid.back_writer(BlockIndex(0));

        let before = front.total_volume();
        let outcome = update_block_full(&front, &meta, &mut writer);

        assert!(outcome.change > 0.0, "a bump must register as change");
        assert!((back_volume(&grid) - before).abs() < 1e-3);

        let bump = grid.cell_back(8, 8).fluid_height;
        assert!(bump < 3.0 && bump > 1.0, "bump should spread, not vanish");
        assert!(grid.cell_back(7, 8).fluid_height > 1.0);
        assert!(grid.cell_back(9, 8).fluid_height > 1.0);
        let n = grid.cells_per_axis();
        for y in 0..n {
            for x in 0..n {
                assert!(grid.cell_back(x, y).fluid_height >= 0.0);
            }
        }
    }

    #[test]
    fn flat_block_reports_no_change() {
        let grid = seeded_grid(BLOCK_SIZE, 1.0, &[]);
        let front = grid.front_view();
        let meta = grid.meta_view();
        let mut writer = grid.back_writer(BlockIndex(0));

        let outcome = update_block_full(&front, &meta, &mut writer);
        assert_eq!(outcome.change, 0.0);
        assert!(!outcome.wake);
    }

    #[test]
    fn sourced_block_stays_awake() {
        let grid = seeded_grid(BLOCK_SIZE, 1.0, &[]);
        {
            let mut meta = grid.meta_mut();
            let index = grid.cell_index(4, 4);
            meta[index].source_height = 5.0;
            meta[index].source_capacity = 0.1;
        }
        let front = grid.front_view();
        let meta = grid.meta_view();
        let mut writer = grid.back_writer(BlockIndex(0));

        let outcome = update_block_full(&front, &meta, &mut writer);
        assert!(outcome.wake, "a live source must hold its block active");
        let sourced = grid.cell_back(4, 4).fluid_height;
        assert!((sourced - 1.1).abs() < 1e-6, "capacity bounds the per-frame fill");
    }

    #[test]
    fn seam_check_is_idempotent_without_active_neighbors() {
        let grid = seeded_grid(BLOCK_SIZE * 2, 1.0, &[]);
        for i in 0..grid.block_count() {
            grid.block(BlockIndex(i)).set_active(false);
        }
        let front = grid.front_view();
        let meta = grid.meta_view();
        let mut writer = grid.back_writer(BlockIndex(0));

        let outcome = update_block_seam(&grid, BlockIndex(0), &front, &meta, &mut writer);
        assert_eq!(outcome.change, 0.0);
        assert!(!outcome.wake);
        for y in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                assert_eq!(grid.cell_back(x, y), grid.cell_front(x, y));
            }
        }
    }

    #[test]
    fn seam_check_wakes_on_active_disturbance() {
        // Block 1 is active and carries a wall of fluid right at the seam;
        // dormant block 0 must notice it.
        let grid = seeded_grid(
            BLOCK_SIZE * 2,
            1.0,
            &[
                (BLOCK_SIZE, 4, 4.0),
                (BLOCK_SIZE, 5, 4.0),
                (BLOCK_SIZE, 6, 4.0),
            ],
        );
        grid.block(BlockIndex(0)).set_active(false);

        let front = grid.front_view();
        let meta = grid.meta_view();
        let mut writer = grid.back_writer(BlockIndex(0));

        let outcome = update_block_seam(&grid, BlockIndex(0), &front, &meta, &mut writer);
        assert!(outcome.wake, "seam difference must wake the block");
        assert!(outcome.change > 0.0);
        // The boundary column took the inflow into the destination plane.
        assert!(grid.cell_back(BLOCK_SIZE - 1, 4).fluid_height > 1.0);
        // Interior cells were carried forward untouched.
        assert_eq!(grid.cell_back(4, 4), grid.cell_front(4, 4));
    }
}
