use anneal_chain_types::ValidatorRecord;
use anneal_params::{Params, PPM_SCALE};

/// Suitability score of a validator for leadership, in parts per million.
///
/// `S = w_u * uptime + w_p * past_performance + w_t * throughput
///      - w_l * latency_term`
///
/// The latency term is the mean latency normalized against the configured
/// ceiling and saturates at 1, so the weighted sum stays in
/// `[0, PPM_SCALE]` (the subtraction saturates at zero). All arithmetic is
/// integer; the same record scores identically on every node.
pub fn suitability_score_ppm(record: &ValidatorRecord, params: &Params) -> u64 {
    let w = &params.score_weights;
    let health = &record.health;

    let latency_ppm = if params.latency_ceiling_ms == 0 {
        0
    } else {
        (health.mean_latency_ms.min(params.latency_ceiling_ms) * PPM_SCALE)
            / params.latency_ceiling_ms
    };

    let positive = w.uptime * health.uptime_ppm
        + w.past_performance * health.past_performance_ppm()
        + w.throughput * health.throughput_ppm;
    let penalty = w.latency * latency_ppm;

    (positive.saturating_sub(penalty) / PPM_SCALE).min(PPM_SCALE)
}

#[cfg(test)]
mod tests {
    use anneal_chain_types::HealthMetrics;
    use anneal_primitives::Keypair;

    use super::*;

    fn record_with(health: HealthMetrics) -> ValidatorRecord {
        let mut rec = ValidatorRecord::new(
            Keypair::generate().public_key(),
            1,
            "127.0.0.1:7000".parse().unwrap(),
        );
        rec.health = health;
        rec
    }

    #[test]
    fn perfect_record_scores_full() {
        let rec = record_with(HealthMetrics::default());
        assert_eq!(suitability_score_ppm(&rec, &Params::default()), PPM_SCALE);
    }

    #[test]
    fn latency_subtracts() {
        let params = Params::default();
        let rec = record_with(HealthMetrics {
            mean_latency_ms: params.latency_ceiling_ms,
            ..HealthMetrics::default()
        });
        // full latency penalty = w.latency
        assert_eq!(
            suitability_score_ppm(&rec, &params),
            PPM_SCALE - params.score_weights.latency
        );
    }

    #[test]
    fn score_never_underflows() {
        let params = Params::default();
        let rec = record_with(HealthMetrics {
            uptime_ppm: 0,
            throughput_ppm: 0,
            proposals_ok: 0,
            proposals_failed: 10,
            mean_latency_ms: 10_000,
            ..HealthMetrics::default()
        });
        assert_eq!(suitability_score_ppm(&rec, &params), 0);
    }

    #[test]
    fn failed_proposals_lower_the_score() {
        let params = Params::default();
        let good = record_with(HealthMetrics::default());
        let flaky = record_with(HealthMetrics {
            proposals_ok: 1,
            proposals_failed: 3,
            ..HealthMetrics::default()
        });
        assert!(
            suitability_score_ppm(&flaky, &params) < suitability_score_ppm(&good, &params)
        );
    }
}
