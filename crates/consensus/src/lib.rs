//! Block verification, vote aggregation, and BFT finalization.
//!
//! Every reconstructed block runs the verification pipeline in a fixed
//! order (producer, signature, chain linkage, PoH replay, re-execution,
//! state root), a YES vote is cast for blocks that pass, and a block finalizes
//! once the admissible YES votes of healthy validators reach quorum.

mod task;
mod tracker;
mod verify;
mod votes;

pub use task::{build_consensus_task, ConsensusContext, ConsensusHandle, VoteSink};
pub use tracker::{BlockPhase, BlockTracker};
pub use verify::{verify_block, VerifiedBlock, VerifyError};
pub use votes::{quorum_threshold, VoteAggregator, VoteOutcome};
