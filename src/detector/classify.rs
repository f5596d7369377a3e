use std::collections::HashSet;

use super::extract::MetricSeries;
use crate::config::DetectorConfig;
use crate::stats;
use crate::types::BrokerId;

/// Flag brokers whose current value for one metric is abnormally high.
///
/// Two independent tests run per broker and either one fires the flag: the
/// history test compares the broker against a percentile of its own past,
/// catching drift from its baseline; the peer test compares it against a
/// percentile of all monitored brokers' current values, catching brokers
/// that are outliers even on a day their own history looks unremarkable.
pub fn metric_anomalies(series: &MetricSeries, config: &DetectorConfig) -> HashSet<BrokerId> {
    let mut flagged = HashSet::new();
    flag_from_history(series, config, &mut flagged);
    flag_from_peers(series, config, &mut flagged);
    flagged
}

fn flag_from_history(
    series: &MetricSeries,
    config: &DetectorConfig,
    flagged: &mut HashSet<BrokerId>,
) {
    for (&broker, &current) in &series.current {
        let history = match series.history.get(&broker) {
            Some(h) => h,
            None => continue,
        };
        if !stats::is_data_sufficient(history.len(), config.metric_history_percentile) {
            continue;
        }
        if let Some(base) = stats::percentile(history, config.metric_history_percentile) {
            if current > base * config.metric_history_margin {
                flagged.insert(broker);
            }
        }
    }
}

fn flag_from_peers(
    series: &MetricSeries,
    config: &DetectorConfig,
    flagged: &mut HashSet<BrokerId>,
) {
    if !stats::is_data_sufficient(series.current.len(), config.peer_metric_percentile) {
        return;
    }
    let values: Vec<f64> = series.current.values().copied().collect();
    let base = match stats::percentile(&values, config.peer_metric_percentile) {
        Some(base) => base,
        None => return,
    };
    for (&broker, &current) in &series.current {
        if current > base * config.peer_metric_margin {
            flagged.insert(broker);
        }
    }
}

/// A broker is anomalous for the round only when both metrics flag it: the
/// raw latency catches outright stalls, the per-byte ratio catches latency
/// disproportionate to the work done. Either alone misclassifies high-load
/// or idle brokers.
pub fn intersect(flush: HashSet<BrokerId>, per_byte: &HashSet<BrokerId>) -> HashSet<BrokerId> {
    flush
        .into_iter()
        .filter(|broker| per_byte.contains(broker))
        .collect()
}
