use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Detector tunables.
///
/// Every field has a default; every construction path ends in
/// [`DetectorConfig::validate`], which rejects out-of-range values with a
/// descriptive error instead of clamping them.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Bytes-in rate (B/s) below which a broker serves negligible traffic
    /// and is excluded from detection for the round
    #[serde(default = "default_bytes_in_rate_detection_threshold")]
    pub bytes_in_rate_detection_threshold: f64,
    /// Percentile of a broker's own metric history used as its baseline
    #[serde(default = "default_metric_history_percentile")]
    pub metric_history_percentile: f64,
    /// Multiplicative margin over the history baseline before a value is
    /// considered abnormally high
    #[serde(default = "default_metric_history_margin")]
    pub metric_history_margin: f64,
    /// Percentile of the peer distribution used as the cluster baseline
    #[serde(default = "default_peer_metric_percentile")]
    pub peer_metric_percentile: f64,
    /// Multiplicative margin over the peer baseline
    #[serde(default = "default_peer_metric_margin")]
    pub peer_metric_margin: f64,
    /// Slowness score at which a broker becomes eligible for demotion
    #[serde(default = "default_demotion_score")]
    pub demotion_score: u32,
    /// Slowness score at which a broker becomes eligible for removal;
    /// scores saturate here
    #[serde(default = "default_decommission_score")]
    pub decommission_score: u32,
    /// Maximum fraction of the cluster that may be flagged in one round
    /// before auto-remediation is declined
    #[serde(default = "default_self_healing_unfixable_ratio")]
    pub self_healing_unfixable_ratio: f64,
    /// Whether removal-typed anomalies are cleared for auto-remediation
    #[serde(default)]
    pub slow_broker_removal_enabled: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            bytes_in_rate_detection_threshold: default_bytes_in_rate_detection_threshold(),
            metric_history_percentile: default_metric_history_percentile(),
            metric_history_margin: default_metric_history_margin(),
            peer_metric_percentile: default_peer_metric_percentile(),
            peer_metric_margin: default_peer_metric_margin(),
            demotion_score: default_demotion_score(),
            decommission_score: default_decommission_score(),
            self_healing_unfixable_ratio: default_self_healing_unfixable_ratio(),
            slow_broker_removal_enabled: false,
        }
    }
}

impl DetectorConfig {
    /// Build a configuration from a flat map of string-keyed options.
    ///
    /// Unknown keys are ignored, missing keys take their defaults, and any
    /// parse or range violation rejects the whole configuration.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = options.get("bytes_in_rate_detection_threshold") {
            config.bytes_in_rate_detection_threshold =
                parse_f64("bytes_in_rate_detection_threshold", raw)?;
        }
        if let Some(raw) = options.get("metric_history_percentile") {
            config.metric_history_percentile = parse_f64("metric_history_percentile", raw)?;
        }
        if let Some(raw) = options.get("metric_history_margin") {
            config.metric_history_margin = parse_f64("metric_history_margin", raw)?;
        }
        if let Some(raw) = options.get("peer_metric_percentile") {
            config.peer_metric_percentile = parse_f64("peer_metric_percentile", raw)?;
        }
        if let Some(raw) = options.get("peer_metric_margin") {
            config.peer_metric_margin = parse_f64("peer_metric_margin", raw)?;
        }
        if let Some(raw) = options.get("demotion_score") {
            config.demotion_score = parse_u32("demotion_score", raw)?;
        }
        if let Some(raw) = options.get("decommission_score") {
            config.decommission_score = parse_u32("decommission_score", raw)?;
        }
        if let Some(raw) = options.get("self_healing_unfixable_ratio") {
            config.self_healing_unfixable_ratio =
                parse_f64("self_healing_unfixable_ratio", raw)?;
        }
        if let Some(raw) = options.get("slow_broker_removal_enabled") {
            config.slow_broker_removal_enabled = parse_bool("slow_broker_removal_enabled", raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML, e.g. a `[slow_broker]` table the
    /// host lifted out of its own config file. Unknown keys are ignored.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).with_context(|| "Failed to parse slow broker configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check every tunable against its allowed range
    pub fn validate(&self) -> Result<()> {
        if !self.bytes_in_rate_detection_threshold.is_finite()
            || self.bytes_in_rate_detection_threshold < 0.0
        {
            bail!(
                "bytes_in_rate_detection_threshold must be non-negative, got {}",
                self.bytes_in_rate_detection_threshold
            );
        }
        if !(0.0..=100.0).contains(&self.metric_history_percentile) {
            bail!(
                "metric_history_percentile must be in range [0.0, 100.0], got {}",
                self.metric_history_percentile
            );
        }
        if !self.metric_history_margin.is_finite() || self.metric_history_margin < 1.0 {
            bail!(
                "metric_history_margin must not be less than 1.0, got {}",
                self.metric_history_margin
            );
        }
        if !(0.0..=100.0).contains(&self.peer_metric_percentile) {
            bail!(
                "peer_metric_percentile must be in range [0.0, 100.0], got {}",
                self.peer_metric_percentile
            );
        }
        if !self.peer_metric_margin.is_finite() || self.peer_metric_margin < 1.0 {
            bail!(
                "peer_metric_margin must not be less than 1.0, got {}",
                self.peer_metric_margin
            );
        }
        if self.decommission_score < self.demotion_score {
            bail!(
                "decommission_score must not be less than demotion_score, got {} < {}",
                self.decommission_score,
                self.demotion_score
            );
        }
        if !(0.0..=1.0).contains(&self.self_healing_unfixable_ratio) {
            bail!(
                "self_healing_unfixable_ratio must be in range [0.0, 1.0], got {}",
                self.self_healing_unfixable_ratio
            );
        }
        Ok(())
    }
}

fn parse_f64(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("{} must be a number, got '{}'", key, raw))
}

fn parse_u32(key: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", key, raw))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    raw.trim()
        .parse::<bool>()
        .with_context(|| format!("{} must be true or false, got '{}'", key, raw))
}

// Default value functions
fn default_bytes_in_rate_detection_threshold() -> f64 { 1024.0 * 1024.0 }
fn default_metric_history_percentile() -> f64 { 90.0 }
fn default_metric_history_margin() -> f64 { 3.0 }
fn default_peer_metric_percentile() -> f64 { 50.0 }
fn default_peer_metric_margin() -> f64 { 10.0 }
fn default_demotion_score() -> u32 { 5 }
fn default_decommission_score() -> u32 { 50 }
fn default_self_healing_unfixable_ratio() -> f64 { 0.1 }
