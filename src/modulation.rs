//! Modulation-index controller.
//!
//! AIMD control of the in-group rate index, run at every statistics
//! aggregation. While the selected cell's throughput keeps up with its
//! long-horizon average, the index probes upward (additively, or
//! multiplicatively after consecutive wins). Degradation steps it
//! down, severely degraded epochs multiplicatively. A probe that loses
//! against the average reverts to the pre-probe index and backs off
//! the adaptive re-evaluation interval.

use crate::fixed::ewma;
use crate::mcs::GROUP_RATES;
use crate::station::HtStation;

impl HtStation {
    /// Re-evaluate the in-group rate index against the throughput
    /// averages. Runs from the statistics aggregator.
    pub(crate) fn check_modulation_index(&mut self) {
        let cell_tp = self.groups[self.cur_group].rates[self.cur_ridx].cur_tp;
        let multiplicative = self.consecutive > 1;

        if self.probing_mod {
            self.probing_mod = false;
            if cell_tp < self.avg_tp && self.last_ridx != self.cur_ridx {
                // losing probe: revert and back off unless the recent
                // streak earned a quick retry
                tracing::debug!(
                    from = self.cur_ridx,
                    to = self.last_ridx,
                    "modulation probe lost, reverting"
                );
                self.consecutive = 0;
                self.apply_rate(self.last_ridx, self.last_streams);
                self.oscillations += 1;
                self.time_interval = if multiplicative {
                    self.config.probe_interval
                } else {
                    self.config.probe_backoff_interval
                };
            } else if cell_tp > self.last_tp && self.last_ridx != self.cur_ridx {
                self.consecutive += 1;
                self.time_interval = self.config.probe_interval;
            } else {
                self.consecutive = 0;
            }
            return;
        }

        if self.tx_ok + self.tx_err > 0 {
            self.avg_tp = ewma(self.avg_tp, cell_tp, self.config.avg_tp_weight);
        }
        if self.avg_tp == 0 {
            return;
        }

        let mild = (self.avg_tp as u64 * self.config.mild_degrade_pct as u64 / 100) as u32;
        let severe = (self.avg_tp as u64 * self.config.severe_degrade_pct as u64 / 100) as u32;
        let mut ridx = self.cur_ridx;

        if cell_tp >= self.avg_tp {
            self.successive = 0;
            if ridx + 1 < GROUP_RATES && self.oscillations == 0 {
                ridx = if multiplicative {
                    (2 * ridx).min(GROUP_RATES - 1)
                } else {
                    ridx + 1
                };
                self.probing_mod = !self.probing_enh;
            }
        } else if cell_tp >= mild {
            // within tolerance, hold
        } else if cell_tp >= severe {
            if ridx > 0 {
                ridx -= 1;
            }
            self.consecutive = 0;
            self.oscillations = 0;
        } else {
            self.successive += 1;
            if self.successive > 1 && ridx >= 1 {
                ridx = ridx * 3 / 4;
            } else if ridx > 0 {
                ridx -= 1;
            }
            self.consecutive = 0;
            self.oscillations = 0;
        }

        self.last_tp = cell_tp;
        self.last_ridx = self.cur_ridx;
        self.last_streams = self.cur_streams;
        if ridx != self.cur_ridx {
            tracing::debug!(from = self.cur_ridx, to = ridx, "modulation index change");
            let streams = self.cur_streams;
            self.apply_rate(ridx, streams);
            self.tx_ok = 0;
            self.tx_err = 0;
            self.tx_retr = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RateAdaptConfig;
    use crate::report::{PhyTiming, StationCaps};
    use crate::station::HtStation;

    fn station() -> HtStation {
        let caps = StationCaps {
            rx_mask: [0xff; 3],
            short_gi_20: true,
            short_gi_40: true,
            width_40: true,
        };
        let timing = PhyTiming {
            overhead: 120,
            overhead_rtscts: 240,
        };
        HtStation::new(&caps, timing, RateAdaptConfig::default(), 0).unwrap()
    }

    #[test]
    fn test_quiet_station_holds() {
        let mut sta = station();
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 7);
        assert_eq!(sta.avg_tp, 0);
        assert!(!sta.probing_mod);
    }

    #[test]
    fn test_thriving_cell_probes_upward() {
        let mut sta = station();
        sta.cur_ridx = 3;
        sta.groups[11].rates[3].cur_tp = 1000;
        sta.avg_tp = 500;
        sta.tx_ok = 10;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 4);
        assert!(sta.probing_mod);
        assert_eq!(sta.last_ridx, 3);
        assert_eq!(sta.successive, 0);
        // the move to the new cell starts a fresh epoch
        assert_eq!(sta.tx_ok, 0);
    }

    #[test]
    fn test_multiplicative_increase_after_streak() {
        let mut sta = station();
        sta.cur_ridx = 3;
        sta.consecutive = 2;
        sta.groups[11].rates[3].cur_tp = 1000;
        sta.avg_tp = 500;
        sta.tx_ok = 10;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 6);
    }

    #[test]
    fn test_oscillation_blocks_probing() {
        let mut sta = station();
        sta.cur_ridx = 3;
        sta.oscillations = 1;
        sta.groups[11].rates[3].cur_tp = 1000;
        sta.avg_tp = 500;
        sta.tx_ok = 10;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 3);
        assert!(!sta.probing_mod);
    }

    #[test]
    fn test_losing_probe_reverts_and_backs_off() {
        let mut sta = station();
        sta.probing_mod = true;
        sta.last_ridx = 5;
        sta.last_streams = 3;
        sta.cur_ridx = 7;
        sta.avg_tp = 1000;
        sta.groups[11].rates[7].cur_tp = 100;
        sta.check_modulation_index();
        assert!(!sta.probing_mod);
        assert_eq!(sta.current_rate(), 5);
        assert_eq!(sta.oscillations, 1);
        assert_eq!(sta.consecutive, 0);
        assert_eq!(sta.time_interval, sta.config.probe_backoff_interval);
    }

    #[test]
    fn test_losing_probe_in_streak_retries_quickly() {
        let mut sta = station();
        sta.probing_mod = true;
        sta.consecutive = 2;
        sta.last_ridx = 5;
        sta.last_streams = 3;
        sta.cur_ridx = 7;
        sta.avg_tp = 1000;
        sta.groups[11].rates[7].cur_tp = 100;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 5);
        assert_eq!(sta.time_interval, sta.config.probe_interval);
    }

    #[test]
    fn test_winning_probe_extends_streak() {
        let mut sta = station();
        sta.probing_mod = true;
        sta.last_ridx = 6;
        sta.last_streams = 3;
        sta.cur_ridx = 7;
        sta.last_tp = 100;
        sta.avg_tp = 100;
        sta.groups[11].rates[7].cur_tp = 500;
        sta.check_modulation_index();
        assert!(!sta.probing_mod);
        assert_eq!(sta.current_rate(), 7);
        assert_eq!(sta.consecutive, 1);
        assert_eq!(sta.time_interval, sta.config.probe_interval);
    }

    #[test]
    fn test_scenario_sustained_severe_degradation() {
        let mut sta = station();
        assert_eq!(sta.current_rate(), 7);
        sta.avg_tp = 1000;
        sta.groups[11].rates[7].cur_tp = 100;
        sta.tx_ok = 10;

        // avg blends to 280, cell at 100 is below 75% of it
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 6);
        assert_eq!(sta.successive, 1);

        // second severe epoch in a row: multiplicative decrease
        sta.tx_ok = 10;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 4);
        assert_eq!(sta.successive, 2);
    }

    #[test]
    fn test_mild_degradation_steps_down_once() {
        let mut sta = station();
        sta.avg_tp = 1000;
        sta.consecutive = 3;
        // ewma blend lands avg at 680; 600 sits between 75% and 90%
        sta.groups[11].rates[7].cur_tp = 600;
        sta.tx_ok = 10;
        sta.check_modulation_index();
        assert_eq!(sta.current_rate(), 6);
        assert_eq!(sta.consecutive, 0);
        assert_eq!(sta.successive, 0);
    }
}
