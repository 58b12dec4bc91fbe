use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale for fixed-point ratios: one million parts per whole.
///
/// Scores, weights, and ratios are carried as parts-per-million integers so
/// selection arithmetic is byte-reproducible across platforms.
pub const PPM_SCALE: u64 = 1_000_000;

/// Weights for the validator suitability score, in parts per million.
///
/// `uptime + past_performance + throughput` must sum to [`PPM_SCALE`]; the
/// latency weight is subtractive and the scored latency term is normalized
/// against [`Params::latency_ceiling_ms`] so the final score stays within
/// `[0, PPM_SCALE]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub uptime: u64,
    pub past_performance: u64,
    pub throughput: u64,
    pub latency: u64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            uptime: 400_000,
            past_performance: 300_000,
            throughput: 300_000,
            latency: 200_000,
        }
    }
}

/// Invalid parameter combinations.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("slot duration {0:?} outside 400ms..=2s")]
    SlotDurationOutOfRange(Duration),
    #[error("epoch must be at least {min} slots to keep the schedule horizon, got {got}")]
    EpochTooShort { min: u64, got: u64 },
    #[error("score weights sum to {0} ppm, expected 1000000")]
    BadWeightSum(u64),
    #[error("shred payload length must be a nonzero even number, got {0}")]
    BadShredPayload(usize),
}

/// Network-wide protocol parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Wall-clock duration of one slot. Must lie in 400ms..=2s.
    pub slot_duration: Duration,
    /// Number of slots per epoch.
    pub epoch_slots: u64,
    /// Minimum number of future slots the published schedules must cover.
    pub schedule_horizon: u64,
    /// How many slots a recent blockhash stays valid, and the mempool TTL
    /// in slots.
    pub blockhash_window_slots: u64,
    /// Minimum sequential hash rate of the PoH chain, in hashes per second
    /// of slot duration. Not consensus-critical; the recorded sequence is.
    pub poh_min_hash_rate: u64,
    /// Trailing ticks appended before a block is emitted.
    pub poh_trailing_ticks: u32,
    /// Healthy-for-voting: minimum uptime fraction, in ppm.
    pub min_uptime_ppm: u64,
    /// Healthy-for-voting: maximum age of the last-seen timestamp.
    pub max_last_seen: Duration,
    /// Suitability score weights.
    pub score_weights: ScoreWeights,
    /// Latency at or above which the latency score term saturates.
    pub latency_ceiling_ms: u64,
    /// Recency penalty coefficient for leader selection, in ppm. A
    /// validator's weight is divided by
    /// `1 + penalty_ppm * recent_leaderships / PPM_SCALE`.
    pub leader_penalty_ppm: u64,
    /// How many trailing slots count toward `recent_leaderships`.
    pub leader_lookback_slots: u64,
    /// Turbine tree fanout.
    pub turbine_fanout: usize,
    /// Fixed shred payload size in bytes.
    pub shred_payload_len: usize,
    /// Recovery shred ratio, in ppm of the data shred count.
    pub shred_recovery_ppm: u64,
    /// Executor worker pool size.
    pub executor_workers: usize,
    /// Optional cap on transactions per block. `None` means unlimited; the
    /// slot deadline is then the only bound.
    pub max_block_txs: Option<usize>,
    /// Extra time after the slot end before an unfinalized slot is treated
    /// as skipped.
    pub quorum_grace: Duration,
    /// Fast-path network read timeout.
    pub net_read_timeout: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            slot_duration: Duration::from_millis(400),
            epoch_slots: 200,
            schedule_horizon: 200,
            blockhash_window_slots: 150,
            poh_min_hash_rate: 5_000,
            poh_trailing_ticks: 3,
            min_uptime_ppm: 500_000,
            max_last_seen: Duration::from_secs(30),
            score_weights: ScoreWeights::default(),
            latency_ceiling_ms: 1_000,
            leader_penalty_ppm: 500_000,
            leader_lookback_slots: 8,
            turbine_fanout: 200,
            shred_payload_len: 1_280,
            shred_recovery_ppm: 330_000,
            executor_workers: 8,
            max_block_txs: None,
            quorum_grace: Duration::from_millis(200),
            net_read_timeout: Duration::from_millis(100),
        }
    }
}

impl Params {
    /// Check internal consistency. Call once at startup.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.slot_duration < Duration::from_millis(400)
            || self.slot_duration > Duration::from_secs(2)
        {
            return Err(ParamsError::SlotDurationOutOfRange(self.slot_duration));
        }
        // Both the live epoch and the pre-computed next epoch are published,
        // so the worst-case coverage just before rollover is one full epoch.
        if self.epoch_slots < self.schedule_horizon {
            return Err(ParamsError::EpochTooShort {
                min: self.schedule_horizon,
                got: self.epoch_slots,
            });
        }
        let w = &self.score_weights;
        let sum = w.uptime + w.past_performance + w.throughput;
        if sum != PPM_SCALE {
            return Err(ParamsError::BadWeightSum(sum));
        }
        // the erasure code works on two-byte symbols
        if self.shred_payload_len == 0 || self.shred_payload_len % 2 != 0 {
            return Err(ParamsError::BadShredPayload(self.shred_payload_len));
        }
        Ok(())
    }

    /// The epoch a slot belongs to.
    pub fn epoch_of_slot(&self, slot: u64) -> u64 {
        slot / self.epoch_slots
    }

    /// First slot of an epoch.
    pub fn epoch_start_slot(&self, epoch: u64) -> u64 {
        epoch * self.epoch_slots
    }

    /// Whether `slot` is at or past the halfway mark of its epoch, the
    /// point where the next epoch's schedule must exist.
    pub fn past_epoch_midpoint(&self, slot: u64) -> bool {
        slot % self.epoch_slots >= self.epoch_slots / 2
    }

    /// Minimum tick-entry count for one slot under the density floor.
    pub fn poh_min_ticks_per_slot(&self) -> u64 {
        let nanos = self.slot_duration.as_nanos() as u64;
        self.poh_min_hash_rate * nanos / 1_000_000_000
    }

    /// Number of recovery shreds to generate for `data_count` data shreds,
    /// rounded up.
    pub fn shred_recovery_count(&self, data_count: usize) -> usize {
        let d = data_count as u64;
        (d * self.shred_recovery_ppm).div_ceil(PPM_SCALE) as usize
    }

    /// How long a transaction may wait in the mempool before expiring.
    pub fn mempool_ttl(&self) -> Duration {
        self.slot_duration * self.blockhash_window_slots as u32
    }
}
