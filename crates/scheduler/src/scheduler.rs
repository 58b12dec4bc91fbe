use std::{sync::Arc, time::Duration};

use anneal_chain_types::LeaderSchedule;
use anneal_params::Params;
use anneal_primitives::{Hash32, PublicKey};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    annealing::{build_schedule, Candidate},
    clock::SlotClock,
    registry::ValidatorRegistry,
    score::suitability_score_ppm,
};

/// Scheduler failures.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no healthy validators to schedule epoch {0}")]
    NoHealthyValidators(u64),
    #[error("slot {0} outside the published schedule window")]
    OutOfWindow(u64),
}

/// Answer to the `current()` query.
#[derive(Debug, Clone, Copy)]
pub struct CurrentSlotLeader {
    pub slot: u64,
    pub leader: PublicKey,
    pub time_remaining: Duration,
}

/// The two published schedule tables: the live epoch and the pre-computed
/// one after it.
#[derive(Debug, Clone)]
struct Tables {
    current: Arc<LeaderSchedule>,
    next: Arc<LeaderSchedule>,
}

/// Deterministic slot-to-leader mapping over registered validators.
///
/// Tables are double-buffered: schedule builds happen outside the lock and
/// publication is a pointer flip, so readers never wait on an epoch
/// rollover.
#[derive(Debug)]
pub struct LeaderScheduler {
    params: Arc<Params>,
    epoch_seed: Hash32,
    registry: Arc<ValidatorRegistry>,
    clock: SlotClock,
    tables: RwLock<Tables>,
}

impl LeaderScheduler {
    /// Build the scheduler and the schedules for the first two epochs.
    pub fn new(
        params: Arc<Params>,
        epoch_seed: Hash32,
        registry: Arc<ValidatorRegistry>,
        clock: SlotClock,
        now_ns: u64,
    ) -> Result<Self, SchedulerError> {
        let (slot, _) = clock.slot_at(now_ns);
        let epoch = params.epoch_of_slot(slot);
        let current = Self::build_epoch(&params, epoch_seed, &registry, epoch, now_ns)?;
        let next = Self::build_epoch(&params, epoch_seed, &registry, epoch + 1, now_ns)?;
        Ok(Self {
            params,
            epoch_seed,
            registry,
            clock,
            tables: RwLock::new(Tables { current, next }),
        })
    }

    fn build_epoch(
        params: &Params,
        epoch_seed: Hash32,
        registry: &ValidatorRegistry,
        epoch: u64,
        now_ns: u64,
    ) -> Result<Arc<LeaderSchedule>, SchedulerError> {
        let candidates: Vec<Candidate> = registry
            .healthy_validators(now_ns, params)
            .iter()
            .map(|rec| Candidate {
                key: rec.key,
                score_ppm: suitability_score_ppm(rec, params),
            })
            .collect();
        let schedule = build_schedule(epoch, epoch_seed, params, &candidates)
            .ok_or(SchedulerError::NoHealthyValidators(epoch))?;
        info!(
            epoch,
            start_slot = schedule.start_slot,
            candidates = candidates.len(),
            "leader schedule published"
        );
        Ok(Arc::new(schedule))
    }

    /// The unique leader for `slot`, if it falls inside the published
    /// window.
    pub fn leader_at(&self, slot: u64) -> Result<PublicKey, SchedulerError> {
        let tables = self.tables.read().clone();
        tables
            .current
            .leader_at(slot)
            .or_else(|| tables.next.leader_at(slot))
            .ok_or(SchedulerError::OutOfWindow(slot))
    }

    /// The next `n` slot leaders starting at the current slot.
    pub fn upcoming(&self, n: usize, now_ns: u64) -> Vec<(u64, PublicKey)> {
        let (start, _) = self.clock.slot_at(now_ns);
        (start..start + n as u64)
            .filter_map(|slot| self.leader_at(slot).ok().map(|leader| (slot, leader)))
            .collect()
    }

    /// The current slot, its leader, and the time remaining in the slot.
    pub fn current(&self, now_ns: u64) -> Result<CurrentSlotLeader, SchedulerError> {
        let (slot, time_remaining) = self.clock.slot_at(now_ns);
        Ok(CurrentSlotLeader {
            slot,
            leader: self.leader_at(slot)?,
            time_remaining,
        })
    }

    pub fn clock(&self) -> SlotClock {
        self.clock
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }

    /// Keep the double buffer ahead of the clock. Called once per slot
    /// tick; rebuilds happen outside the table lock and are published with
    /// a pointer flip.
    ///
    /// Pre-computes the following epoch once the current one crosses its
    /// halfway mark, and rotates the buffers at epoch boundaries.
    pub fn ensure_coverage(&self, now_ns: u64) -> Result<(), SchedulerError> {
        let (slot, _) = self.clock.slot_at(now_ns);
        let epoch = self.params.epoch_of_slot(slot);

        let tables = self.tables.read().clone();

        if tables.current.epoch == epoch {
            // live epoch is current; nothing to do until the midpoint
            if !self.params.past_epoch_midpoint(slot) || tables.next.epoch == epoch + 1 {
                return Ok(());
            }
            let next = Self::build_epoch(&self.params, self.epoch_seed, &self.registry, epoch + 1, now_ns)?;
            let mut guard = self.tables.write();
            guard.next = next;
            return Ok(());
        }

        if tables.next.epoch == epoch {
            // normal rollover: promote next, pre-build the one after
            let next =
                Self::build_epoch(&self.params, self.epoch_seed, &self.registry, epoch + 1, now_ns)?;
            let mut guard = self.tables.write();
            guard.current = guard.next.clone();
            guard.next = next;
            return Ok(());
        }

        // the clock jumped more than an epoch; rebuild both
        warn!(
            epoch,
            had_current = tables.current.epoch,
            had_next = tables.next.epoch,
            "schedule window fell behind, rebuilding"
        );
        let current = Self::build_epoch(&self.params, self.epoch_seed, &self.registry, epoch, now_ns)?;
        let next = Self::build_epoch(&self.params, self.epoch_seed, &self.registry, epoch + 1, now_ns)?;
        let mut guard = self.tables.write();
        guard.current = current;
        guard.next = next;
        Ok(())
    }
}
