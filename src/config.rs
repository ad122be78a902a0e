//! Tuning knobs for the rate-adaptation engine.
//!
//! Every empirical constant that drives the controllers (EWMA
//! weights, epoch cadences, success-ratio and streak thresholds,
//! contention-window and retry budgets) is a named field here so a
//! deployment can recalibrate without code changes. The defaults are
//! the values the algorithm was tuned with.

use serde::{Deserialize, Serialize};

use crate::error::{RateError, RateResult};
use crate::report::MAX_RATE_SLOTS;

/// Configuration for one rate-adaptation engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateAdaptConfig {
    /// Weight (percent) kept from the old value when blending per-rate
    /// delivery probability each epoch.
    pub ewma_level: u32,
    /// Weight (percent) kept from the old value when blending the
    /// long-horizon average throughput.
    pub avg_tp_weight: u32,
    /// Statistics aggregation epoch, in caller-supplied ticks.
    pub update_interval: u64,
    /// Cooldown-reset epoch: both direction cooldowns clear on this
    /// cadence.
    pub reset_interval: u64,
    /// Adaptive re-evaluation interval after a failed modulation probe
    /// outside multiplicative mode.
    pub probe_backoff_interval: u64,
    /// Adaptive re-evaluation interval while probing is going well.
    pub probe_interval: u64,
    /// Attempts required in the current window before success-ratio
    /// driven stream/width decisions apply.
    pub attempts_floor: u32,
    /// Success ratio (percent) above which a stream/width upgrade
    /// becomes pending.
    pub upgrade_ratio_pct: u32,
    /// Success ratio (percent) below which a single-stream downgrade
    /// becomes pending (and the narrow channel is permitted again).
    pub downgrade_ratio_pct: u32,
    /// Consecutive AMPDU-level stream failures that trigger a pending
    /// downgrade on multi-stream groups.
    pub stream_failure_limit: u32,
    /// Upper bound, as percent of average throughput, of the mild
    /// degradation band (step down by one).
    pub mild_degrade_pct: u32,
    /// Lower bound, as percent of average throughput; below this the
    /// degradation is severe (multiplicative decrease).
    pub severe_degrade_pct: u32,
    /// Minimum contention window, in slots.
    pub cw_min: u32,
    /// Maximum contention window, in slots.
    pub cw_max: u32,
    /// Ceiling on per-candidate retry counts.
    pub max_retry: u32,
    /// Time budget for one packet's retry burst, in microseconds.
    pub segment_size: u32,
    /// Rate slots the device can chain per transmission (1..=4).
    pub max_rate_slots: usize,
    /// Device supports multi-rate retry; affects the sampling seed.
    pub has_mrr: bool,
}

impl Default for RateAdaptConfig {
    fn default() -> Self {
        Self {
            ewma_level: 75,
            avg_tp_weight: 20,
            update_interval: 100,
            reset_interval: 1000,
            probe_backoff_interval: 900,
            probe_interval: 100,
            attempts_floor: 30,
            upgrade_ratio_pct: 90,
            downgrade_ratio_pct: 15,
            stream_failure_limit: 3,
            mild_degrade_pct: 90,
            severe_degrade_pct: 75,
            cw_min: 15,
            cw_max: 1023,
            max_retry: 7,
            segment_size: 6000,
            max_rate_slots: 4,
            has_mrr: true,
        }
    }
}

impl RateAdaptConfig {
    /// Check field ranges. Run once when a station is created.
    pub fn validate(&self) -> RateResult<()> {
        if self.ewma_level > 100 || self.avg_tp_weight > 100 {
            return Err(RateError::InvalidConfig(
                "EWMA weights must be percentages".into(),
            ));
        }
        if self.severe_degrade_pct >= self.mild_degrade_pct || self.mild_degrade_pct > 100 {
            return Err(RateError::InvalidConfig(
                "degradation bands must satisfy severe < mild <= 100".into(),
            ));
        }
        if self.cw_min > self.cw_max {
            return Err(RateError::InvalidConfig("cw_min exceeds cw_max".into()));
        }
        if self.max_retry < 2 {
            return Err(RateError::InvalidConfig("max_retry must be at least 2".into()));
        }
        if self.segment_size == 0 {
            return Err(RateError::InvalidConfig("segment_size must be nonzero".into()));
        }
        if self.max_rate_slots == 0 || self.max_rate_slots > MAX_RATE_SLOTS {
            return Err(RateError::InvalidConfig(format!(
                "max_rate_slots must be 1..={}",
                MAX_RATE_SLOTS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RateAdaptConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut cfg = RateAdaptConfig::default();
        cfg.ewma_level = 101;
        assert!(cfg.validate().is_err());

        let mut cfg = RateAdaptConfig::default();
        cfg.severe_degrade_pct = 95;
        assert!(cfg.validate().is_err());

        let mut cfg = RateAdaptConfig::default();
        cfg.cw_min = 2048;
        assert!(cfg.validate().is_err());

        let mut cfg = RateAdaptConfig::default();
        cfg.max_rate_slots = 9;
        assert!(cfg.validate().is_err());

        let mut cfg = RateAdaptConfig::default();
        cfg.max_retry = 1;
        assert!(cfg.validate().is_err());
    }
}
