use std::collections::HashMap;

use anneal_chain_types::ValidatorRecord;
use anneal_params::Params;
use anneal_primitives::PublicKey;
use parking_lot::RwLock;
use tracing::debug;

/// The registered validator set as the local node sees it.
///
/// Records originate in the peer directory (gossip-fed, eventually
/// consistent) and carry locally observed health metrics. Schedule builds
/// snapshot this registry; live mutation never perturbs a published
/// schedule.
#[derive(Debug, Default)]
pub struct ValidatorRegistry {
    records: RwLock<HashMap<PublicKey, ValidatorRecord>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a directory record, preserving any health metrics
    /// already tracked for the key.
    pub fn upsert(&self, record: ValidatorRecord) {
        let mut records = self.records.write();
        match records.get_mut(&record.key) {
            Some(existing) => {
                existing.stake = record.stake;
                existing.address = record.address;
            }
            None => {
                debug!(key = %record.key, stake = record.stake, "validator registered");
                records.insert(record.key, record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, key: &PublicKey) -> Option<ValidatorRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.records.read().contains_key(key)
    }

    /// Record that a message from `key` was observed now.
    pub fn note_seen(&self, key: &PublicKey, now_ns: u64) {
        if let Some(rec) = self.records.write().get_mut(key) {
            rec.health.last_seen_ns = rec.health.last_seen_ns.max(now_ns);
        }
    }

    /// Update liveness metrics for `key`.
    pub fn note_metrics(&self, key: &PublicKey, uptime_ppm: u64, mean_latency_ms: u64) {
        if let Some(rec) = self.records.write().get_mut(key) {
            rec.health.uptime_ppm = uptime_ppm;
            rec.health.mean_latency_ms = mean_latency_ms;
        }
    }

    pub fn note_proposal(&self, key: &PublicKey, ok: bool) {
        if let Some(rec) = self.records.write().get_mut(key) {
            if ok {
                rec.health.proposals_ok += 1;
            } else {
                rec.health.proposals_failed += 1;
            }
        }
    }

    /// Whether `key` passes the healthy-for-voting predicate right now.
    pub fn is_healthy(&self, key: &PublicKey, now_ns: u64, params: &Params) -> bool {
        self.records
            .read()
            .get(key)
            .map(|rec| rec.healthy_for_voting(now_ns, params))
            .unwrap_or(false)
    }

    /// Count of currently healthy voting validators (the `H` in the quorum
    /// formula).
    pub fn healthy_count(&self, now_ns: u64, params: &Params) -> usize {
        self.records
            .read()
            .values()
            .filter(|rec| rec.healthy_for_voting(now_ns, params))
            .count()
    }

    /// Healthy validators ordered lexicographically by key. This is the
    /// candidate set for schedule building.
    pub fn healthy_validators(&self, now_ns: u64, params: &Params) -> Vec<ValidatorRecord> {
        let mut out: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|rec| rec.healthy_for_voting(now_ns, params))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// All validators ordered by descending stake (key ascending on equal
    /// stake). This ordering shapes the Turbine tree.
    pub fn stake_ordered(&self) -> Vec<ValidatorRecord> {
        let mut out: Vec<_> = self.records.read().values().cloned().collect();
        out.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.key.cmp(&b.key)));
        out
    }
}

#[cfg(test)]
mod tests {
    use anneal_primitives::Keypair;

    use super::*;

    fn record(stake: u64) -> ValidatorRecord {
        let mut rec = ValidatorRecord::new(
            Keypair::generate().public_key(),
            stake,
            "127.0.0.1:9000".parse().unwrap(),
        );
        rec.health.last_seen_ns = 1;
        rec
    }

    #[test]
    fn upsert_preserves_health() {
        let registry = ValidatorRegistry::new();
        let rec = record(10);
        let key = rec.key;
        registry.upsert(rec.clone());
        registry.note_proposal(&key, false);

        // directory refresh with new stake
        let mut refreshed = rec;
        refreshed.stake = 99;
        registry.upsert(refreshed);

        let stored = registry.get(&key).unwrap();
        assert_eq!(stored.stake, 99);
        assert_eq!(stored.health.proposals_failed, 1);
    }

    #[test]
    fn healthy_count_applies_predicate() {
        let params = Params::default();
        let registry = ValidatorRegistry::new();
        let healthy = record(1);
        let mut unhealthy = record(1);
        unhealthy.health.uptime_ppm = 100_000;
        registry.upsert(healthy);
        registry.upsert(unhealthy);
        assert_eq!(registry.healthy_count(2, &params), 1);
    }

    #[test]
    fn stake_ordering_is_stable() {
        let registry = ValidatorRegistry::new();
        for stake in [5, 50, 5] {
            registry.upsert(record(stake));
        }
        let ordered = registry.stake_ordered();
        assert_eq!(ordered[0].stake, 50);
        // equal stakes tie-break by key
        assert!(ordered[1].key < ordered[2].key);
    }

    #[test]
    fn note_seen_never_regresses() {
        let registry = ValidatorRegistry::new();
        let rec = record(1);
        let key = rec.key;
        registry.upsert(rec);
        registry.note_seen(&key, 500);
        registry.note_seen(&key, 100);
        assert_eq!(registry.get(&key).unwrap().health.last_seen_ns, 500);
    }
}
