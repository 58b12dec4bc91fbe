//! Annealing-style leader selection.
//!
//! Each slot draws its leader from the healthy validator set with weights
//! proportional to the suitability score, damped for validators that led
//! recently. The draw is driven entirely by `H(epoch_seed || slot)` and
//! integer arithmetic, so every node derives the identical schedule.

use std::collections::VecDeque;

use anneal_chain_types::LeaderSchedule;
use anneal_params::{Params, PPM_SCALE};
use anneal_primitives::{sha256_parts, Hash32, PublicKey};

/// A candidate for leadership: key plus pre-computed suitability score.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub key: PublicKey,
    pub score_ppm: u64,
}

/// Build the full leader schedule for `epoch`.
///
/// `candidates` must already be filtered to healthy validators; they are
/// re-sorted lexicographically here so the cumulative weight walk (and
/// therefore tie-breaking) is order-independent of the caller.
///
/// Returns `None` when there are no candidates; the caller treats the
/// epoch as unschedulable.
pub fn build_schedule(
    epoch: u64,
    epoch_seed: Hash32,
    params: &Params,
    candidates: &[Candidate],
) -> Option<LeaderSchedule> {
    if candidates.is_empty() {
        return None;
    }
    let mut ordered: Vec<Candidate> = candidates.to_vec();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));

    let start_slot = params.epoch_start_slot(epoch);
    let mut leaders = Vec::with_capacity(params.epoch_slots as usize);
    // sliding window of the last `leader_lookback_slots` picks
    let mut recent: VecDeque<usize> = VecDeque::new();
    let mut recent_counts = vec![0u64; ordered.len()];

    for offset in 0..params.epoch_slots {
        let slot = start_slot + offset;
        let pick = select_leader(slot, epoch_seed, params, &ordered, &recent_counts);

        leaders.push(ordered[pick].key);
        recent.push_back(pick);
        recent_counts[pick] += 1;
        if recent.len() > params.leader_lookback_slots as usize {
            let expired = recent.pop_front().expect("window non-empty");
            recent_counts[expired] -= 1;
        }
    }

    Some(LeaderSchedule {
        epoch,
        start_slot,
        leaders,
    })
}

/// One weighted draw. The effective weight of candidate `i` is
/// `score * PPM / (PPM + penalty * recent_i)`, the recency-damped score.
/// If every weight rounds to zero the draw falls back to uniform, keeping
/// the schedule total and leaving ties to lexicographic candidate order.
fn select_leader(
    slot: u64,
    epoch_seed: Hash32,
    params: &Params,
    ordered: &[Candidate],
    recent_counts: &[u64],
) -> usize {
    let weights: Vec<u64> = ordered
        .iter()
        .zip(recent_counts)
        .map(|(cand, &recent)| {
            let damp = PPM_SCALE + params.leader_penalty_ppm * recent;
            cand.score_ppm * PPM_SCALE / damp
        })
        .collect();

    let total: u64 = weights.iter().sum();
    let seed = sha256_parts(&[epoch_seed.as_ref(), &slot.to_le_bytes()]);
    let draw = u64::from_le_bytes(seed.as_bytes()[..8].try_into().expect("8 bytes"));

    if total == 0 {
        return (draw % ordered.len() as u64) as usize;
    }

    let mut point = draw % total;
    for (i, &w) in weights.iter().enumerate() {
        if point < w {
            return i;
        }
        point -= w;
    }
    // cumulative walk always terminates inside the loop
    unreachable!("draw below total weight")
}
