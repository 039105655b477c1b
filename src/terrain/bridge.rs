use super::{CellRect, HeightField};
use crate::constants::grid::BLOCK_SIZE;
use crate::grid::Grid;

/// Rewrites `terrain_height` for every cell in `rect` from the height field
/// and force-activates the owning blocks, so a dormant block cannot miss a
/// terrain edit. Returns how many blocks were newly activated.
///
/// Takes exclusive metadata access; callers must ensure no dispatch cycle is
/// in flight.
pub(crate) fn sync_rect(grid: &Grid, field: &HeightField, rect: CellRect) -> usize {
    debug_assert_eq!(field.cells_per_axis(), grid.cells_per_axis());
    let rect = rect.clamped(grid.cells_per_axis());
    if rect.is_empty() {
        return 0;
    }

    {
        let mut meta = grid.meta_mut();
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                meta[grid.cell_index(x, y)].terrain_height = field.cell_height(x, y);
            }
        }
    }

    let b0x = rect.x0 / BLOCK_SIZE;
    let b0y = rect.y0 / BLOCK_SIZE;
    let b1x = (rect.x1 - 1) / BLOCK_SIZE;
    let b1y = (rect.y1 - 1) / BLOCK_SIZE;
    let mut woken = 0;
    for by in b0y..=b1y {
        for bx in b0x..=b1x {
            let state = grid.block_at(bx, by);
            if !state.is_active() {
                state.set_active(true);
                woken += 1;
            }
        }
    }
    woken
}
