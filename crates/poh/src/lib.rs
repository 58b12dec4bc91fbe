//! The Proof-of-History sequencer: a dense sequential SHA-256 chain that
//! interleaves time-mark ticks with transaction digests, and the replay
//! verifier that reproduces it.
//!
//! The recorder is single-threaded per slot and owns the running hash
//! exclusively; nothing in here suspends.

mod recorder;

pub use recorder::{verify_sequence, PohRecorder, PohVerifyError};
