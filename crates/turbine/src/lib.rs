//! Turbine block propagation: erasure-coded shredding, the stake-weighted
//! distribution tree, per-block reassembly buffers, and the send/receive
//! tasks.

mod buffers;
mod propagator;
mod shredder;
mod topology;

pub use buffers::{InsertOutcome, ReassemblyBuffers};
pub use propagator::{broadcast_block, shred_receive_task, ReceiveContext, ShredSink};
pub use shredder::{make_shreds, reassemble_block, TurbineError};
pub use topology::TurbineTree;
