//! Parallel transaction execution.
//!
//! Transactions are planned into conflict-free batches that preserve the
//! observable effect of serial execution in input order, then each batch
//! runs concurrently on a worker pool. Workers receive owned shards of the
//! account table (disjoint by construction) so the hot path takes no locks.

mod batch;
mod execute;

pub use batch::plan_batches;
pub use execute::{ExecutionOutput, Executor, ExecutorError, SkipReason};
