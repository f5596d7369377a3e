use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashSet};

use super::scoreboard::SlownessScoreboard;
use crate::config::DetectorConfig;
use crate::types::{BrokerId, Remediation, SlowBrokerAnomaly};

/// Turn this round's anomalous brokers into emitted anomalies.
///
/// Brokers whose slowness score saturated at the decommission threshold are
/// proposed for removal; brokers at or above the demotion threshold for
/// demotion. If the two bands together cover more of the cluster than the
/// unfixable ratio allows, a single anomaly with the union is emitted and
/// auto-remediation is declined: that many simultaneously slow brokers
/// points at a cluster-wide problem, not individual faulty nodes.
pub fn create_anomalies(
    anomalous: &HashSet<BrokerId>,
    scoreboard: &SlownessScoreboard,
    cluster_size: usize,
    now_ms: i64,
    config: &DetectorConfig,
) -> Vec<SlowBrokerAnomaly> {
    let mut to_demote: BTreeMap<BrokerId, i64> = BTreeMap::new();
    let mut to_remove: BTreeMap<BrokerId, i64> = BTreeMap::new();
    for &broker in anomalous {
        let entry = match scoreboard.get(broker) {
            Some(entry) => entry,
            None => continue,
        };
        if entry.score == config.decommission_score {
            to_remove.insert(broker, entry.first_detected_at_ms);
        } else if entry.score >= config.demotion_score {
            to_demote.insert(broker, entry.first_detected_at_ms);
        }
    }

    let flagged = to_demote.len() + to_remove.len();
    let mut anomalies = Vec::new();
    if flagged as f64 > cluster_size as f64 * config.self_healing_unfixable_ratio {
        to_demote.extend(to_remove);
        anomalies.push(build_anomaly(to_demote, false, Remediation::Demote, now_ms));
    } else {
        if !to_demote.is_empty() {
            anomalies.push(build_anomaly(to_demote, true, Remediation::Demote, now_ms));
        }
        if !to_remove.is_empty() {
            anomalies.push(build_anomaly(
                to_remove,
                config.slow_broker_removal_enabled,
                Remediation::Remove,
                now_ms,
            ));
        }
    }
    anomalies
}

fn build_anomaly(
    brokers: BTreeMap<BrokerId, i64>,
    fixable: bool,
    remediation: Remediation,
    now_ms: i64,
) -> SlowBrokerAnomaly {
    let description = describe(&brokers);
    SlowBrokerAnomaly {
        brokers,
        fixable,
        remediation,
        description,
        detection_time_ms: now_ms,
    }
}

fn describe(brokers: &BTreeMap<BrokerId, i64>) -> String {
    let entries: Vec<String> = brokers
        .iter()
        .map(|(broker, &first_detected_at_ms)| {
            format!(
                "Broker {}'s performance degraded at {}",
                broker,
                format_timestamp(first_detected_at_ms)
            )
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}

fn format_timestamp(epoch_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(epoch_ms) {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{}ms", epoch_ms),
    }
}
