//! Block production: assembling one block from admissible pending
//! transactions when the local node holds the slot leadership, and the
//! task that drives it slot by slot.

mod block;
mod task;

pub use block::{build_block, BlockAssemblyInputs, BlockAssemblyOutputs, BuildError};
pub use task::{leader_loop, LeaderLoopContext};
