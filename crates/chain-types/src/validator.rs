use std::net::SocketAddr;

use anneal_params::{Params, PPM_SCALE};
use anneal_primitives::PublicKey;

/// Liveness and performance metrics tracked per registered validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthMetrics {
    /// Uptime fraction in parts per million of the observation window.
    pub uptime_ppm: u64,
    /// Last time any message from this validator was observed, in
    /// nanoseconds since the unix epoch.
    pub last_seen_ns: u64,
    /// Mean observed network latency.
    pub mean_latency_ms: u64,
    /// Relative throughput score in parts per million.
    pub throughput_ppm: u64,
    pub proposals_ok: u64,
    pub proposals_failed: u64,
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            uptime_ppm: PPM_SCALE,
            last_seen_ns: 0,
            mean_latency_ms: 0,
            throughput_ppm: PPM_SCALE,
            proposals_ok: 0,
            proposals_failed: 0,
        }
    }
}

impl HealthMetrics {
    /// Past-performance fraction: successful proposals over total, full
    /// score when the validator has never led.
    pub fn past_performance_ppm(&self) -> u64 {
        let total = self.proposals_ok + self.proposals_failed;
        if total == 0 {
            PPM_SCALE
        } else {
            self.proposals_ok * PPM_SCALE / total
        }
    }
}

/// A registered validator as seen through the peer directory, plus the
/// locally tracked health metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRecord {
    pub key: PublicKey,
    /// Stake weight; orders the Turbine tree. Not used in vote counting.
    pub stake: u64,
    pub health: HealthMetrics,
    pub address: SocketAddr,
}

impl ValidatorRecord {
    pub fn new(key: PublicKey, stake: u64, address: SocketAddr) -> Self {
        Self {
            key,
            stake,
            health: HealthMetrics::default(),
            address,
        }
    }

    /// The healthy-for-voting predicate: sufficient uptime and recently
    /// seen. Unhealthy validators neither vote nor appear in the leader
    /// schedule.
    pub fn healthy_for_voting(&self, now_ns: u64, params: &Params) -> bool {
        if self.health.uptime_ppm < params.min_uptime_ppm {
            return false;
        }
        let age_ns = now_ns.saturating_sub(self.health.last_seen_ns);
        age_ns <= params.max_last_seen.as_nanos() as u64
    }
}
