pub mod config;
pub mod detector;
pub mod stats;

pub use config::DetectorConfig;
pub use detector::{MetricAnomalyFinder, SlowBrokerFinder};

/// Common types used across modules
pub mod types {
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    /// Broker identifier
    #[derive(
        Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    )]
    pub struct BrokerId(pub u32);

    /// Latest metric sample for one broker
    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    pub struct MetricSnapshot {
        /// 99.9th-percentile log flush latency in milliseconds
        pub log_flush_p999_ms: f64,
        /// Bytes/sec ingress as partition leader
        pub leader_bytes_in: f64,
        /// Bytes/sec ingress from replication
        pub replication_bytes_in: f64,
    }

    impl MetricSnapshot {
        pub fn total_bytes_in(&self) -> f64 {
            self.leader_bytes_in + self.replication_bytes_in
        }
    }

    /// Historical metric series for one broker.
    ///
    /// The three series are index-aligned: position `i` in each vector
    /// belongs to the same historical sample.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct MetricHistory {
        pub log_flush_p999_ms: Vec<f64>,
        pub leader_bytes_in: Vec<f64>,
        pub replication_bytes_in: Vec<f64>,
    }

    /// Self-healing action proposed for a slow broker
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Remediation {
        /// Move partition leadership off the broker, keep it in the cluster
        Demote,
        /// Evacuate the broker's replicas so it can be taken out of service
        Remove,
    }

    impl Remediation {
        pub fn is_removal(&self) -> bool {
            matches!(self, Remediation::Remove)
        }
    }

    /// A confirmed slow-broker anomaly, emitted once per detection round
    /// per remediation type
    #[derive(Debug, Clone, Serialize)]
    pub struct SlowBrokerAnomaly {
        /// Affected brokers mapped to the epoch milliseconds at which their
        /// degradation was first detected
        pub brokers: BTreeMap<BrokerId, i64>,
        /// True when the control plane is cleared to auto-remediate; false
        /// means the anomaly is emitted for operator review only
        pub fixable: bool,
        pub remediation: Remediation,
        pub description: String,
        /// Wall clock of the round that emitted this anomaly
        pub detection_time_ms: i64,
    }

    impl std::fmt::Display for BrokerId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::fmt::Display for Remediation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Remediation::Demote => write!(f, "demote"),
                Remediation::Remove => write!(f, "remove"),
            }
        }
    }
}
