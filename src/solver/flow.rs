//! Per-edge flow transfer.
//!
//! Every grid edge is owned by its higher-index cell, which stores the flow
//! value with outgoing-positive orientation. The transfer itself is a pure
//! function of front-plane state, so the non-owning side re-derives the
//! identical value instead of reading its neighbor's back cell. That is what
//! keeps every back cell single-writer during a dispatch cycle.

use crate::constants::solver::{
    FLOW_DAMPING, FLOW_FRICTION, MAX_PLAUSIBLE_FLOW, MAX_TRANSFER_FRACTION, MIN_FLOW,
    MIN_FLUID_HEIGHT,
};
use crate::grid::{Cell, CellMeta};

/// One side of an edge as the solver sees it.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSide {
    pub fluid_height: f32,
    pub terrain_height: f32,
}

impl EdgeSide {
    pub fn new(cell: &Cell, meta: &CellMeta) -> Self {
        Self {
            fluid_height: cell.fluid_height,
            terrain_height: meta.terrain_height,
        }
    }

    #[inline]
    fn surface(&self) -> f32 {
        self.terrain_height + self.fluid_height
    }
}

/// Outcome of solving one edge from one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeFlow {
    /// Value the owning side stores in its flow slot (low-pass history)
    pub stored: f32,
    /// Signed height change this side applies this frame
    pub height_delta: f32,
}

/// Computes one frame's transfer across a single edge, seen from one side.
///
/// `sign` is +1 when the caller owns the edge and -1 when it is the
/// non-owning side re-deriving the same edge; `prev_stored` is the owner's
/// front-plane flow value either way. Both sides compute the identical
/// stored value and opposite height deltas.
pub fn solve_edge(this: EdgeSide, neighbor: EdgeSide, prev_stored: f32, sign: f32) -> EdgeFlow {
    let height_diff = this.fluid_height - neighbor.fluid_height;
    let terrain_diff = this.terrain_height - neighbor.terrain_height;
    let target = (height_diff + terrain_diff) * FLOW_FRICTION;

    // First-order low-pass on the oriented flow keeps the explicit stencil
    // from ringing.
    let mut flow = sign * prev_stored * FLOW_DAMPING + target * (1.0 - FLOW_DAMPING);

    debug_assert!(
        flow.is_finite() && flow.abs() <= MAX_PLAUSIBLE_FLOW,
        "implausible flow {flow} across edge"
    );
    if !flow.is_finite() {
        log::warn!("[FlowSolver] non-finite flow discarded");
        flow = 0.0;
    } else {
        flow = flow.clamp(-MAX_PLAUSIBLE_FLOW, MAX_PLAUSIBLE_FLOW);
    }

    // No frame moves more than a quarter of either cell's standing fluid.
    flow = flow.clamp(
        -neighbor.fluid_height * MAX_TRANSFER_FRACTION,
        this.fluid_height * MAX_TRANSFER_FRACTION,
    );

    // Momentum carried by the low-pass may point uphill after the gradient
    // reversed. Such a flow is rejected: it stays in the stored history so
    // it keeps decaying, but it must never move fluid.
    let rejected = if flow > 0.0 {
        neighbor.surface() > this.surface()
    } else if flow < 0.0 {
        this.surface() > neighbor.surface()
    } else {
        false
    };

    // Tiny flows touching a near-dry cell jitter forever around zero;
    // suppress them outright.
    if flow.abs() < MIN_FLOW
        && (this.fluid_height <= MIN_FLUID_HEIGHT || neighbor.fluid_height <= MIN_FLUID_HEIGHT)
    {
        return EdgeFlow {
            stored: 0.0,
            height_delta: 0.0,
        };
    }

    EdgeFlow {
        stored: sign * flow,
        height_delta: if rejected { 0.0 } else { -flow },
    }
}

/// Pulls a sourced cell toward its target level, rate-limited by the
/// source's per-frame capacity and floored at zero.
pub fn settle_source(height: f32, meta: &CellMeta) -> f32 {
    if !meta.has_source() {
        return height;
    }
    let step = (meta.source_height - height).clamp(-meta.source_capacity, meta.source_capacity);
    (height + step).max(0.0)
}
