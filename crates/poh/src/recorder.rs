use anneal_chain_types::PohEntry;
use anneal_primitives::{sha256, sha256_parts, Hash32};
use thiserror::Error;

/// The running PoH hash chain for one slot.
///
/// `reset` seeds the chain (with the parent block hash at a slot start),
/// `tick` advances it by one empty hash, and `record` mixes a transaction
/// digest in. Each operation appends one entry; an entry's sequence index
/// is its position in the recorded chain.
#[derive(Debug)]
pub struct PohRecorder {
    seed: Hash32,
    running: Hash32,
    entries: Vec<PohEntry>,
}

impl PohRecorder {
    /// Start a chain from `seed`.
    pub fn new(seed: Hash32) -> Self {
        Self {
            seed,
            running: seed,
            entries: Vec::new(),
        }
    }

    /// Drop all recorded entries and restart from a new seed.
    pub fn reset(&mut self, seed: Hash32) {
        self.seed = seed;
        self.running = seed;
        self.entries.clear();
    }

    /// Append a tick entry: `hash = H(running)`.
    pub fn tick(&mut self) {
        self.running = sha256(self.running.as_ref());
        self.entries.push(PohEntry {
            hash: self.running,
            digest: None,
        });
    }

    /// Append a transaction-bearing entry: `hash = H(running || digest)`.
    pub fn record(&mut self, digest: Hash32) {
        self.running = sha256_parts(&[self.running.as_ref(), digest.as_ref()]);
        self.entries.push(PohEntry {
            hash: self.running,
            digest: Some(digest),
        });
    }

    pub fn seed(&self) -> Hash32 {
        self.seed
    }

    /// The latest chain value.
    pub fn running_hash(&self) -> Hash32 {
        self.running
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tick entries since the last recorded digest (or since the
    /// seed). The builder uses this to enforce its density policy.
    pub fn ticks_since_last_record(&self) -> usize {
        self.entries
            .iter()
            .rev()
            .take_while(|entry| entry.is_tick())
            .count()
    }

    pub fn entries(&self) -> &[PohEntry] {
        &self.entries
    }

    /// Consume the recorder and yield the slot's chain.
    pub fn into_entries(self) -> Vec<PohEntry> {
        self.entries
    }
}

/// A replay mismatch at a specific entry.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("poh mismatch at entry {index}: expected {expected}, recorded {recorded}")]
pub struct PohVerifyError {
    pub index: usize,
    pub expected: Hash32,
    pub recorded: Hash32,
}

/// Replay a recorded chain from its seed and compare every entry
/// byte-for-byte. Cost is one hash per entry, independent of transaction
/// execution.
pub fn verify_sequence(seed: Hash32, entries: &[PohEntry]) -> Result<(), PohVerifyError> {
    let mut running = seed;
    for (index, entry) in entries.iter().enumerate() {
        let expected = match &entry.digest {
            None => sha256(running.as_ref()),
            Some(digest) => sha256_parts(&[running.as_ref(), digest.as_ref()]),
        };
        if expected != entry.hash {
            return Err(PohVerifyError {
                index,
                expected,
                recorded: entry.hash,
            });
        }
        running = expected;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Hash32 {
        sha256(b"seed")
    }

    #[test]
    fn recorded_chain_replays() {
        let mut poh = PohRecorder::new(seed());
        poh.tick();
        poh.record(sha256(b"tx-1"));
        poh.tick();
        poh.tick();
        poh.record(sha256(b"tx-2"));
        poh.tick();

        verify_sequence(seed(), poh.entries()).unwrap();
    }

    #[test]
    fn tampered_entry_is_detected() {
        let mut poh = PohRecorder::new(seed());
        poh.tick();
        poh.record(sha256(b"tx-1"));
        poh.tick();

        let mut entries = poh.into_entries();
        entries[1].digest = Some(sha256(b"tx-other"));
        let err = verify_sequence(seed(), &entries).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn wrong_seed_fails_at_first_entry() {
        let mut poh = PohRecorder::new(seed());
        poh.tick();
        let entries = poh.into_entries();
        let err = verify_sequence(sha256(b"other"), &entries).unwrap_err();
        assert_eq!(err.index, 0);
    }

    #[test]
    fn chain_depends_on_digest_position() {
        let mut a = PohRecorder::new(seed());
        a.record(sha256(b"tx"));
        a.tick();

        let mut b = PohRecorder::new(seed());
        b.tick();
        b.record(sha256(b"tx"));

        assert_ne!(a.running_hash(), b.running_hash());
    }

    #[test]
    fn tick_counting_for_density() {
        let mut poh = PohRecorder::new(seed());
        poh.tick();
        poh.record(sha256(b"tx"));
        assert_eq!(poh.ticks_since_last_record(), 0);
        poh.tick();
        poh.tick();
        poh.tick();
        assert_eq!(poh.ticks_since_last_record(), 3);
    }

    #[test]
    fn reset_discards_history() {
        let mut poh = PohRecorder::new(seed());
        poh.tick();
        poh.reset(sha256(b"next-parent"));
        assert!(poh.is_empty());
        assert_eq!(poh.running_hash(), sha256(b"next-parent"));
    }

    #[test]
    fn empty_sequence_verifies() {
        verify_sequence(seed(), &[]).unwrap();
    }
}
