pub mod classify;
pub mod escalate;
pub mod extract;
pub mod scoreboard;

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::types::{BrokerId, MetricHistory, MetricSnapshot, SlowBrokerAnomaly};
use self::scoreboard::SlownessScoreboard;

/// Trait for per-round metric anomaly finders.
///
/// The host control plane drives finders from its detection scheduler: each
/// round it hands over the per-broker history window and current snapshots,
/// and the finder returns the anomalies it confirmed.
pub trait MetricAnomalyFinder: Send + Sync {
    /// Human-readable name for this finder
    fn name(&self) -> &str;

    /// Run one detection round. `history` carries the brokers the host
    /// considers live (its size is the cluster size); `current` may cover a
    /// subset of them. `now_ms` is the wall clock used for first-detection
    /// timestamps. Rounds must not be reordered by the caller.
    fn detect_round(
        &self,
        history: &HashMap<BrokerId, MetricHistory>,
        current: &HashMap<BrokerId, MetricSnapshot>,
        now_ms: i64,
    ) -> Vec<SlowBrokerAnomaly>;
}

/// Detects brokers with degraded I/O performance from collected metrics.
///
/// Each broker is checked on two metrics: the raw p999 log flush latency
/// and the same latency divided by ingress bytes. A metric is abnormally
/// high when it exceeds a margin over a percentile of the broker's own
/// history, or over a percentile of its peers' current values. A broker
/// flagged on both metrics accrues slowness score across rounds; sustained
/// degradation escalates to a demotion proposal and eventually a removal
/// proposal, while recovered brokers decay off the scoreboard.
pub struct SlowBrokerFinder {
    config: DetectorConfig,
    scoreboard: Mutex<SlownessScoreboard>,
}

impl SlowBrokerFinder {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            scoreboard: Mutex::new(SlownessScoreboard::default()),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Current slowness score for a broker, if it is under suspicion.
    /// Exposed for host introspection endpoints.
    pub fn slowness_score(&self, broker: BrokerId) -> Option<u32> {
        self.scoreboard.lock().unwrap().score(broker)
    }

    /// Number of brokers currently under suspicion
    pub fn suspected_broker_count(&self) -> usize {
        self.scoreboard.lock().unwrap().len()
    }

    fn run_round(
        &self,
        board: &mut SlownessScoreboard,
        history: &HashMap<BrokerId, MetricHistory>,
        current: &HashMap<BrokerId, MetricSnapshot>,
        now_ms: i64,
    ) -> Result<Vec<SlowBrokerAnomaly>> {
        let extracted = extract::extract_metrics(history, current, &self.config)?;
        if !extracted.skipped.is_empty() {
            info!(
                brokers = ?extracted.skipped,
                "Skipping slowness check for brokers serving negligible traffic"
            );
        }

        let flush_flags = classify::metric_anomalies(&extracted.flush, &self.config);
        let per_byte_flags = classify::metric_anomalies(&extracted.per_byte, &self.config);
        let anomalous: HashSet<BrokerId> = classify::intersect(flush_flags, &per_byte_flags);

        board.update(&anomalous, now_ms, self.config.decommission_score);
        Ok(escalate::create_anomalies(
            &anomalous,
            board,
            history.len(),
            now_ms,
            &self.config,
        ))
    }
}

impl MetricAnomalyFinder for SlowBrokerFinder {
    fn name(&self) -> &str {
        "slow-broker"
    }

    fn detect_round(
        &self,
        history: &HashMap<BrokerId, MetricHistory>,
        current: &HashMap<BrokerId, MetricSnapshot>,
        now_ms: i64,
    ) -> Vec<SlowBrokerAnomaly> {
        info!(cluster_size = history.len(), "Slow broker detection started");
        // The lock is held for the whole round; rounds are serialized.
        let mut state = self.scoreboard.lock().unwrap();
        // Run against a working copy so a failed round leaves no partial
        // score updates behind.
        let mut working = state.clone();
        let anomalies = match self.run_round(&mut working, history, current, now_ms) {
            Ok(anomalies) => {
                *state = working;
                for anomaly in &anomalies {
                    debug!(
                        remediation = %anomaly.remediation,
                        fixable = anomaly.fixable,
                        brokers = anomaly.brokers.len(),
                        "Emitting slow broker anomaly"
                    );
                }
                anomalies
            }
            Err(e) => {
                warn!(error = %e, "Slow broker detection round failed");
                Vec::new()
            }
        };
        info!(anomalies = anomalies.len(), "Slow broker detection finished");
        anomalies
    }
}
