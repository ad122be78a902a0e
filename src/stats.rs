//! Per-rate delivery statistics and per-group runtime state.
//!
//! Each (group, rate) cell tracks a current attempts/success window,
//! the previous window, cumulative histograms and an EWMA delivery
//! probability in Q16. Throughput is derived from the probability and
//! the precomputed transmit duration, amortizing per-frame overhead
//! over the average AMPDU length.

use crate::fixed::{ewma, frac, trunc, FRAC_BITS};
use crate::mcs::GROUP_RATES;

/// Delivery statistics for one (group, rate) cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateStats {
    /// Attempts in the current sampling window.
    pub attempts: u32,
    /// Successes in the current sampling window.
    pub success: u32,
    /// Window counters from the previous epoch.
    pub last_attempts: u32,
    pub last_success: u32,
    /// Cumulative attempt/success histograms.
    pub att_hist: u64,
    pub succ_hist: u64,
    /// Delivery probability of the last rolled window, Q16.
    pub cur_prob: u32,
    /// EWMA delivery probability, Q16.
    pub probability: u32,
    /// Estimated throughput at the last aggregation.
    pub cur_tp: u32,
    /// Cached retry-chain length without RTS/CTS.
    pub retry_count: u32,
    /// Cached retry-chain length with RTS/CTS.
    pub retry_count_rtscts: u32,
    /// The cached retry counts are valid for this epoch.
    pub retry_updated: bool,
    /// Consecutive quiet epochs with no attempts.
    pub sample_skipped: u8,
}

impl RateStats {
    /// Roll the sampling window and blend the delivery probability.
    ///
    /// A window with traffic updates the EWMA (the first observation
    /// seeds it directly); a quiet window leaves the probability
    /// untouched and only bumps the skip counter, so silence neither
    /// rewards nor penalizes a rate.
    pub fn update_ewma(&mut self, ewma_level: u32) {
        if self.attempts > 0 {
            self.sample_skipped = 0;
            self.cur_prob = frac(self.success, self.attempts);
            if self.att_hist == 0 {
                self.probability = self.cur_prob;
            } else {
                self.probability = ewma(self.probability, self.cur_prob, ewma_level);
            }
            self.att_hist += self.attempts as u64;
            self.succ_hist += self.success as u64;
        } else {
            self.sample_skipped = self.sample_skipped.saturating_add(1);
        }
        self.last_success = self.success;
        self.last_attempts = self.attempts;
        self.success = 0;
        self.attempts = 0;
    }

    /// Recompute `cur_tp` for this cell. `duration` is the µs cost of
    /// one average packet at this rate, `avg_ampdu_len` is Q16. Rates
    /// below 10% delivery probability count as zero throughput.
    pub fn update_throughput(&mut self, duration: u32, overhead: u32, avg_ampdu_len: u32) {
        if self.probability < frac(1, 10) {
            self.cur_tp = 0;
            return;
        }
        let usecs = (overhead / trunc(avg_ampdu_len).max(1) + duration).max(1);
        let per_sec = (1_000_000 / usecs) as u64;
        self.cur_tp = ((per_sec * self.probability as u64) >> FRAC_BITS) as u32;
    }

    /// Full reset. Applied when the cell becomes the new selection.
    pub fn reset(&mut self) {
        *self = RateStats::default();
    }
}

/// Runtime state for one MCS group.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupData {
    /// Bitmask of supported rates within the group.
    pub supported: u8,
    /// Flat (group * 8 + rate) index of the group's best-throughput
    /// rate.
    pub max_tp_rate: usize,
    /// Flat index of the runner-up throughput rate.
    pub max_tp_rate2: usize,
    /// Flat index of the group's best-probability rate.
    pub max_prob_rate: usize,
    /// Per-rate statistics.
    pub rates: [RateStats; GROUP_RATES],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FRAC_ONE;

    #[test]
    fn test_first_observation_seeds_probability() {
        let mut mr = RateStats::default();
        mr.attempts = 10;
        mr.success = 9;
        mr.update_ewma(75);
        assert_eq!(mr.probability, frac(9, 10));
        assert_eq!(mr.att_hist, 10);
        assert_eq!(mr.last_attempts, 10);
        assert_eq!(mr.attempts, 0);
    }

    #[test]
    fn test_quiet_window_preserves_memory() {
        let mut mr = RateStats::default();
        mr.attempts = 10;
        mr.success = 10;
        mr.update_ewma(75);
        let before = mr.probability;
        mr.update_ewma(75);
        mr.update_ewma(75);
        assert_eq!(mr.probability, before);
        assert_eq!(mr.sample_skipped, 2);
    }

    #[test]
    fn test_probability_blends_after_seed() {
        let mut mr = RateStats::default();
        mr.attempts = 4;
        mr.success = 4;
        mr.update_ewma(75);
        assert_eq!(mr.probability, FRAC_ONE);
        mr.attempts = 4;
        mr.success = 0;
        mr.update_ewma(75);
        assert_eq!(mr.probability, ewma(FRAC_ONE, 0, 75));
    }

    #[test]
    fn test_low_probability_zeroes_throughput() {
        let mut mr = RateStats::default();
        mr.probability = frac(1, 10) - 1;
        mr.cur_tp = 999;
        mr.update_throughput(100, 200, frac(1, 1));
        assert_eq!(mr.cur_tp, 0);
    }

    #[test]
    fn test_throughput_scales_with_probability() {
        let mut a = RateStats::default();
        let mut b = RateStats::default();
        a.probability = FRAC_ONE;
        b.probability = FRAC_ONE / 2;
        a.update_throughput(100, 200, frac(1, 1));
        b.update_throughput(100, 200, frac(1, 1));
        assert!(a.cur_tp > b.cur_tp);
        // overhead amortized over a longer AMPDU raises throughput
        let mut c = RateStats::default();
        c.probability = FRAC_ONE;
        c.update_throughput(100, 200, frac(8, 1));
        assert!(c.cur_tp > a.cur_tp);
    }
}
