pub mod flow;
pub mod update;

pub use flow::{settle_source, solve_edge, EdgeFlow, EdgeSide};
pub use update::{update_block_full, update_block_seam, BlockOutcome};
