use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::config::DetectorConfig;
use crate::types::{BrokerId, MetricHistory, MetricSnapshot};

/// Flush-time samples at or below this are idle-broker noise; a long run of
/// near-zero samples would collapse the history percentile.
const FLUSH_HISTORY_NOISE_FLOOR_MS: f64 = 5.0;

/// Per-broker inputs to the percentile classifier for one metric
#[derive(Debug, Default)]
pub struct MetricSeries {
    pub current: HashMap<BrokerId, f64>,
    pub history: HashMap<BrokerId, Vec<f64>>,
}

/// Result of the extraction pass over one round's inputs
#[derive(Debug, Default)]
pub struct ExtractedMetrics {
    /// Raw log flush latency
    pub flush: MetricSeries,
    /// Log flush latency per ingress byte
    pub per_byte: MetricSeries,
    /// Brokers excluded this round for serving negligible traffic
    pub skipped: Vec<BrokerId>,
}

/// Derive the two metrics of interest for every broker in the current
/// round, excluding brokers whose ingress is below the detection threshold.
///
/// A broker with no history entry still takes part in the peer test; its
/// history series are left empty so the history test cannot fire.
pub fn extract_metrics(
    history: &HashMap<BrokerId, MetricHistory>,
    current: &HashMap<BrokerId, MetricSnapshot>,
    config: &DetectorConfig,
) -> Result<ExtractedMetrics> {
    let mut extracted = ExtractedMetrics::default();
    for (&broker, snapshot) in current {
        let total_bytes_in = snapshot.total_bytes_in();
        if total_bytes_in < config.bytes_in_rate_detection_threshold || total_bytes_in <= 0.0 {
            extracted.skipped.push(broker);
            continue;
        }
        let per_byte = snapshot.log_flush_p999_ms / total_bytes_in;
        if !per_byte.is_finite() {
            extracted.skipped.push(broker);
            continue;
        }

        let (flush_history, per_byte_history) = match history.get(&broker) {
            Some(h) => {
                check_series_alignment(broker, h)?;
                (flush_history(h), per_byte_history(h, config))
            }
            None => (Vec::new(), Vec::new()),
        };

        extracted.flush.current.insert(broker, snapshot.log_flush_p999_ms);
        extracted.flush.history.insert(broker, flush_history);
        extracted.per_byte.current.insert(broker, per_byte);
        extracted.per_byte.history.insert(broker, per_byte_history);
    }
    extracted.skipped.sort();
    Ok(extracted)
}

fn check_series_alignment(broker: BrokerId, history: &MetricHistory) -> Result<()> {
    let n = history.log_flush_p999_ms.len();
    if history.leader_bytes_in.len() != n || history.replication_bytes_in.len() != n {
        bail!(
            "misaligned metric history for broker {}: flush={} leader={} replication={}",
            broker,
            n,
            history.leader_bytes_in.len(),
            history.replication_bytes_in.len()
        );
    }
    Ok(())
}

fn flush_history(history: &MetricHistory) -> Vec<f64> {
    history
        .log_flush_p999_ms
        .iter()
        .copied()
        .filter(|&v| v > FLUSH_HISTORY_NOISE_FLOOR_MS)
        .collect()
}

fn per_byte_history(history: &MetricHistory, config: &DetectorConfig) -> Vec<f64> {
    let mut values = Vec::with_capacity(history.log_flush_p999_ms.len());
    for (i, &flush) in history.log_flush_p999_ms.iter().enumerate() {
        let total_bytes_in = history.leader_bytes_in[i] + history.replication_bytes_in[i];
        if total_bytes_in >= config.bytes_in_rate_detection_threshold && total_bytes_in > 0.0 {
            let value = flush / total_bytes_in;
            if value.is_finite() {
                values.push(value);
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: f64 = 1024.0 * 1024.0;

    fn snapshot(flush: f64, leader: f64, replication: f64) -> MetricSnapshot {
        MetricSnapshot {
            log_flush_p999_ms: flush,
            leader_bytes_in: leader,
            replication_bytes_in: replication,
        }
    }

    #[test]
    fn test_skip_threshold_boundary() {
        let config = DetectorConfig::default();
        let mut current = HashMap::new();
        // Just below the threshold across both ingress components
        current.insert(BrokerId(1), snapshot(50.0, MB - 1.0, 0.0));
        // Exactly at the threshold
        current.insert(BrokerId(2), snapshot(50.0, MB / 2.0, MB / 2.0));

        let extracted = extract_metrics(&HashMap::new(), &current, &config).unwrap();
        assert_eq!(extracted.skipped, vec![BrokerId(1)]);
        assert!(!extracted.flush.current.contains_key(&BrokerId(1)));
        assert!(extracted.flush.current.contains_key(&BrokerId(2)));
        assert!(extracted.per_byte.current.contains_key(&BrokerId(2)));
    }

    #[test]
    fn test_zero_traffic_skipped_even_with_zero_threshold() {
        let mut config = DetectorConfig::default();
        config.bytes_in_rate_detection_threshold = 0.0;
        let mut current = HashMap::new();
        current.insert(BrokerId(1), snapshot(50.0, 0.0, 0.0));

        let extracted = extract_metrics(&HashMap::new(), &current, &config).unwrap();
        assert_eq!(extracted.skipped, vec![BrokerId(1)]);
        assert!(extracted.per_byte.current.is_empty());
    }

    #[test]
    fn test_flush_history_noise_floor() {
        let config = DetectorConfig::default();
        let mut history = HashMap::new();
        history.insert(
            BrokerId(1),
            MetricHistory {
                log_flush_p999_ms: vec![1.0, 5.0, 6.0, 100.0],
                leader_bytes_in: vec![2.0 * MB; 4],
                replication_bytes_in: vec![0.0; 4],
            },
        );
        let mut current = HashMap::new();
        current.insert(BrokerId(1), snapshot(50.0, 2.0 * MB, 0.0));

        let extracted = extract_metrics(&history, &current, &config).unwrap();
        // 1.0 and 5.0 fall at or below the noise floor
        assert_eq!(extracted.flush.history[&BrokerId(1)], vec![6.0, 100.0]);
    }

    #[test]
    fn test_per_byte_history_divisor_gate() {
        let config = DetectorConfig::default();
        let mut history = HashMap::new();
        history.insert(
            BrokerId(1),
            MetricHistory {
                log_flush_p999_ms: vec![10.0, 20.0, 30.0],
                leader_bytes_in: vec![MB, MB / 4.0, 2.0 * MB],
                replication_bytes_in: vec![0.0, 0.0, 0.0],
            },
        );
        let mut current = HashMap::new();
        current.insert(BrokerId(1), snapshot(50.0, 2.0 * MB, 0.0));

        let extracted = extract_metrics(&history, &current, &config).unwrap();
        // The middle sample's ingress is below the threshold
        let per_byte = &extracted.per_byte.history[&BrokerId(1)];
        assert_eq!(per_byte.len(), 2);
        assert!((per_byte[0] - 10.0 / MB).abs() < 1e-12);
        assert!((per_byte[1] - 30.0 / (2.0 * MB)).abs() < 1e-12);
    }

    #[test]
    fn test_missing_history_yields_empty_series() {
        let config = DetectorConfig::default();
        let mut current = HashMap::new();
        current.insert(BrokerId(7), snapshot(50.0, 2.0 * MB, 0.0));

        let extracted = extract_metrics(&HashMap::new(), &current, &config).unwrap();
        assert!(extracted.flush.history[&BrokerId(7)].is_empty());
        assert!(extracted.per_byte.history[&BrokerId(7)].is_empty());
        assert_eq!(extracted.flush.current[&BrokerId(7)], 50.0);
    }

    #[test]
    fn test_misaligned_history_is_an_error() {
        let config = DetectorConfig::default();
        let mut history = HashMap::new();
        history.insert(
            BrokerId(1),
            MetricHistory {
                log_flush_p999_ms: vec![10.0, 20.0],
                leader_bytes_in: vec![MB],
                replication_bytes_in: vec![0.0, 0.0],
            },
        );
        let mut current = HashMap::new();
        current.insert(BrokerId(1), snapshot(50.0, 2.0 * MB, 0.0));

        assert!(extract_metrics(&history, &current, &config).is_err());
    }
}
