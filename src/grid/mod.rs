pub mod block;
pub mod cell;
pub mod storage;

pub use block::{BlockIndex, BlockState};
pub use cell::{Cell, CellMeta};
pub use storage::{BlockWriter, FrontView, Grid, GridConfigError, MetaView};
