pub mod constants;
pub mod engine;
pub mod grid;
pub mod solver;
pub mod terrain;

pub use engine::{FrameStats, SimulationEngine};
pub use grid::{BlockIndex, Cell, CellMeta, FrontView, Grid, GridConfigError};
pub use terrain::{CellRect, HeightField};
