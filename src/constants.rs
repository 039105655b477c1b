// Flowgrid constants - SINGLE SOURCE OF TRUTH
//
// Every tunable of the simulation lives here. Solver, scheduler, and engine
// code must not define their own copies.

/// Grid partitioning
pub mod grid {
    /// Side length of a scheduling block, in cells. The grid side must be a
    /// multiple of this.
    pub const BLOCK_SIZE: usize = 32;

    /// Cells per block
    pub const CELLS_PER_BLOCK: usize = BLOCK_SIZE * BLOCK_SIZE;
}

/// Flow solver tuning
pub mod solver {
    /// Fraction of the surface-height difference converted into flow each
    /// frame. Must stay well below the quarter-height transfer cap for the
    /// explicit stencil to remain stable.
    pub const FLOW_FRICTION: f32 = 0.25;

    /// First-order low-pass factor on flow. 0 = no smoothing, 1 = frozen.
    pub const FLOW_DAMPING: f32 = 0.85;

    /// No single frame may move more than this fraction of either cell's
    /// standing fluid across one edge.
    pub const MAX_TRANSFER_FRACTION: f32 = 0.25;

    /// Heights at or below this are treated as dry.
    pub const MIN_FLUID_HEIGHT: f32 = 1e-3;

    /// Flows below this magnitude touching a near-dry cell are suppressed
    /// to stop perpetual jitter around zero.
    pub const MIN_FLOW: f32 = 1e-4;

    /// Sanity ceiling for a single computed flow. Exceeding it is an
    /// invariant violation in debug builds and clamped in release builds.
    pub const MAX_PLAUSIBLE_FLOW: f32 = 1e6;
}

/// Block activity scheduling
pub mod activity {
    /// An active block whose combined change metric falls below this goes
    /// dormant.
    pub const DEACTIVATE_THRESHOLD: f32 = 1e-4;

    /// Seam difference that wakes a dormant block.
    pub const REACTIVATE_THRESHOLD: f32 = 1e-3;

    /// Fraction of a neighbor block's change bled into the deactivation
    /// decision, so quiet blocks next to busy ones stay awake.
    pub const NEIGHBOR_CHANGE_BLEED: f32 = 0.5;
}

/// Thread pool sizing
pub mod engine {
    /// Worker floor when the platform reports little or no concurrency.
    pub const MIN_WORKERS: usize = 2;
}
