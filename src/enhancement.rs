//! Stream/group enhancement controller.
//!
//! Runs on every status report, off the raw current-window counters
//! rather than the aggregated EWMA. Sustained AMPDU-level stream
//! failures or a very poor success ratio make a downgrade pending; a
//! very good ratio over enough attempts makes an upgrade pending. A
//! pending transition becomes a probe: the group switches immediately
//! and a later report with traffic on the new cell settles it against
//! the pre-probe throughput snapshot. A losing probe reverts and arms
//! a cooldown for its direction until the next reset epoch.

use crate::fixed::{frac, trunc, FRAC_BITS};
use crate::mcs::MCS_GROUPS;
use crate::report::TxStatusReport;
use crate::station::{HtStation, ProbeDirection};

impl HtStation {
    /// Re-evaluate the MCS group against this report's delivery
    /// outcome. `ampdu_len` and `ack_len` are the report's normalized
    /// subframe counts.
    pub(crate) fn check_enhancement_index(
        &mut self,
        report: &TxStatusReport,
        ampdu_len: u32,
        ack_len: u32,
    ) {
        if self.avg_ampdu_len == 0 {
            self.avg_ampdu_len = frac(1, 1);
        }

        let cell = &self.groups[self.cur_group].rates[self.cur_ridx];
        let attempts = cell.attempts;
        let prob = frac(cell.success, attempts.max(1));

        // instantaneous throughput of the current cell, from the raw
        // window rather than the EWMA
        let duration = MCS_GROUPS[self.cur_group].duration[self.cur_ridx];
        let usecs = (self.overhead / trunc(self.avg_ampdu_len).max(1) + duration).max(1);
        self.cur_tp = (((1_000_000 / usecs) as u64 * prob as u64) >> FRAC_BITS) as u32;

        if self.probing_enh && attempts > 0 {
            self.settle_enhancement_probe();
        }

        self.tx_ok += ack_len;
        self.tx_err += ampdu_len - ack_len;
        if let Some(first) = report.attempts[0] {
            self.tx_retr += first.count.saturating_sub(1);
        }

        let mut want_up = false;
        let mut want_down = false;

        if self.cur_streams > 1 && ampdu_len > 1 {
            // multi-stream: AMPDU-level failure streaks dominate
            if ampdu_len - ack_len > ack_len {
                self.stream_failure += 1;
                self.stream_success = 0;
            } else {
                self.stream_success += 1;
                self.stream_failure = 0;
            }
            if self.stream_failure > self.config.stream_failure_limit {
                self.stream_failure = 0;
                self.stream_success = 0;
                want_down = true;
            }
            if attempts > self.config.attempts_floor
                && prob > frac(self.config.upgrade_ratio_pct, 100)
            {
                want_up = true;
            }
        } else if self.cur_streams == 1 {
            if attempts > self.config.attempts_floor
                && prob > frac(self.config.upgrade_ratio_pct, 100)
            {
                want_up = true;
            }
            if self.cur_group != 0
                && attempts > self.config.attempts_floor
                && prob < frac(self.config.downgrade_ratio_pct, 100)
            {
                // bad enough that falling back to 20 MHz is on the
                // table again
                self.skip_narrow = false;
                want_down = true;
            } else {
                self.skip_narrow = true;
            }
        }

        let idle = !self.probing_mod && !self.probing_enh;
        if want_down && idle && !self.down_bad.active() {
            let orig = self.cur_group;
            if self.downgrade_stream() != orig {
                self.probing_enh = true;
                self.enh_probe_dir = Some(ProbeDirection::Downgrade);
            }
        } else if want_up && idle && !self.up_bad.active() {
            let orig = self.cur_group;
            if self.upgrade_stream() != orig {
                self.probing_enh = true;
                self.enh_probe_dir = Some(ProbeDirection::Upgrade);
            }
        }

        if !self.probing_enh {
            self.last_group = self.cur_group;
            self.elast_tp = self.cur_tp;
        }
    }

    /// Settle an in-flight group probe against the pre-probe snapshot.
    /// Called once the probed cell's window has traffic.
    fn settle_enhancement_probe(&mut self) {
        self.probing_enh = false;
        let dir = self.enh_probe_dir.take();
        if self.cur_tp < self.elast_tp && self.cur_group != self.last_group {
            tracing::debug!(
                from = self.cur_group,
                to = self.last_group,
                "group probe lost, reverting"
            );
            let target = self.last_group;
            self.switch_group(target);
            match dir {
                Some(ProbeDirection::Upgrade) => self.up_bad.arm(),
                Some(ProbeDirection::Downgrade) => self.down_bad.arm(),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RateAdaptConfig;
    use crate::mcs::MCS_GROUPS;
    use crate::report::{PhyTiming, StationCaps, TxRateAttempt, TxStatusReport};
    use crate::station::{HtStation, ProbeDirection};

    fn two_group_caps() -> StationCaps {
        // only (1 stream, long GI, 20) and (2 streams, long GI, 20)
        StationCaps {
            rx_mask: [0xff, 0xff, 0],
            short_gi_20: false,
            short_gi_40: false,
            width_40: false,
        }
    }

    fn station(caps: &StationCaps) -> HtStation {
        let timing = PhyTiming {
            overhead: 120,
            overhead_rtscts: 240,
        };
        HtStation::new(caps, timing, RateAdaptConfig::default(), 0).unwrap()
    }

    fn report_at(sta: &HtStation, ampdu_len: u32, ack_len: u32) -> TxStatusReport {
        TxStatusReport {
            attempts: [
                Some(TxRateAttempt {
                    streams: sta.current_streams(),
                    rate_idx: sta.current_rate(),
                    flags: MCS_GROUPS[sta.current_group()].flags,
                    count: 1,
                }),
                None,
                None,
                None,
            ],
            ampdu_len,
            ampdu_ack_len: ack_len,
            probe: false,
        }
    }

    #[test]
    fn test_scenario_stream_failure_streak_downgrades() {
        let mut sta = station(&two_group_caps());
        assert_eq!(sta.current_group(), 4);
        assert_eq!(sta.current_streams(), 2);
        for now in 1..=4 {
            let report = report_at(&sta, 10, 2);
            sta.report_tx_status(&report, now);
        }
        // fourth failed AMPDU in a row crosses the streak limit
        assert_eq!(sta.current_group(), 0);
        assert_eq!(sta.current_streams(), 1);
        assert!(sta.probing_enh);
        assert_eq!(sta.enh_probe_dir, Some(ProbeDirection::Downgrade));
    }

    #[test]
    fn test_multistream_mpdu_reports_are_not_classified() {
        // single-subframe reports on a multi-stream group carry no
        // stream-level signal: no streaks, no ratio rules
        let mut sta = station(&two_group_caps());
        assert_eq!(sta.current_group(), 4);
        for now in 1..=35 {
            let report = report_at(&sta, 1, 0);
            sta.report_tx_status(&report, now);
        }
        assert_eq!(sta.current_group(), 4);
        assert_eq!(sta.current_streams(), 2);
        assert!(sta.skip_narrow);
        assert!(!sta.probing_enh);
        assert_eq!(sta.stream_failure, 0);
    }

    #[test]
    fn test_streak_below_limit_holds() {
        let mut sta = station(&two_group_caps());
        for now in 1..=3 {
            let report = report_at(&sta, 10, 2);
            sta.report_tx_status(&report, now);
        }
        assert_eq!(sta.current_group(), 4);
        assert_eq!(sta.stream_failure, 3);
        assert!(!sta.probing_enh);
    }

    #[test]
    fn test_good_ratio_probes_upward() {
        let mut sta = station(&two_group_caps());
        sta.switch_group(0);
        let report = report_at(&sta, 40, 40);
        sta.report_tx_status(&report, 1);
        assert_eq!(sta.current_group(), 4);
        assert!(sta.probing_enh);
        assert_eq!(sta.enh_probe_dir, Some(ProbeDirection::Upgrade));
    }

    #[test]
    fn test_armed_cooldown_blocks_direction() {
        let mut sta = station(&two_group_caps());
        sta.down_bad.arm();
        for now in 1..=8 {
            let report = report_at(&sta, 10, 2);
            sta.report_tx_status(&report, now);
        }
        assert_eq!(sta.current_group(), 4);
        assert!(!sta.probing_enh);

        let mut sta = station(&two_group_caps());
        sta.switch_group(0);
        sta.up_bad.arm();
        let report = report_at(&sta, 40, 40);
        sta.report_tx_status(&report, 1);
        assert_eq!(sta.current_group(), 0);
        assert!(!sta.probing_enh);
    }

    #[test]
    fn test_losing_probe_reverts_and_arms_cooldown() {
        let mut sta = station(&two_group_caps());
        sta.switch_group(0);
        sta.probing_enh = true;
        sta.enh_probe_dir = Some(ProbeDirection::Downgrade);
        sta.last_group = 4;
        sta.elast_tp = u32::MAX;
        let report = report_at(&sta, 10, 1);
        sta.report_tx_status(&report, 1);
        assert_eq!(sta.current_group(), 4);
        assert!(!sta.probing_enh);
        assert!(sta.down_bad.active());
        assert!(!sta.up_bad.active());
    }

    #[test]
    fn test_winning_probe_sticks() {
        let mut sta = station(&two_group_caps());
        sta.switch_group(0);
        sta.probing_enh = true;
        sta.enh_probe_dir = Some(ProbeDirection::Upgrade);
        sta.last_group = 4;
        sta.elast_tp = 0;
        let report = report_at(&sta, 10, 10);
        sta.report_tx_status(&report, 1);
        assert_eq!(sta.current_group(), 0);
        assert!(!sta.probing_enh);
        assert!(!sta.up_bad.active());
        // the snapshot moves to the settled cell
        assert_eq!(sta.last_group, 0);
        assert!(sta.elast_tp > 0);
    }

    #[test]
    fn test_quiet_window_leaves_probe_pending() {
        let mut sta = station(&two_group_caps());
        sta.switch_group(0);
        sta.probing_enh = true;
        sta.enh_probe_dir = Some(ProbeDirection::Downgrade);
        sta.last_group = 4;
        sta.elast_tp = u32::MAX;
        // report whose chain never touched the current cell
        let report = TxStatusReport {
            attempts: [
                Some(TxRateAttempt {
                    streams: 2,
                    rate_idx: 3,
                    flags: MCS_GROUPS[4].flags,
                    count: 1,
                }),
                None,
                None,
                None,
            ],
            ampdu_len: 4,
            ampdu_ack_len: 4,
            probe: false,
        };
        sta.report_tx_status(&report, 1);
        assert!(sta.probing_enh);
        assert_eq!(sta.current_group(), 0);
    }

    #[test]
    fn test_poor_single_stream_ratio_permits_narrow_channel() {
        let caps = StationCaps {
            rx_mask: [0xff; 3],
            short_gi_20: true,
            short_gi_40: true,
            width_40: true,
        };
        let mut sta = station(&caps);
        sta.switch_group(2); // (1 stream, long GI, 40 MHz)
        assert!(sta.skip_narrow);
        let report = report_at(&sta, 40, 2);
        sta.report_tx_status(&report, 1);
        assert!(!sta.skip_narrow);
        // narrow groups are reachable again
        assert_eq!(sta.current_group(), 1);
        assert!(!MCS_GROUPS[sta.current_group()].flags.width_40);
        assert!(sta.probing_enh);
    }

    #[test]
    fn test_healthy_single_stream_restores_skip_narrow() {
        let caps = StationCaps {
            rx_mask: [0xff; 3],
            short_gi_20: true,
            short_gi_40: true,
            width_40: true,
        };
        let mut sta = station(&caps);
        sta.switch_group(2);
        sta.skip_narrow = false;
        let report = report_at(&sta, 10, 10);
        sta.report_tx_status(&report, 1);
        assert!(sta.skip_narrow);
    }

    #[test]
    fn test_counters_accumulate_once_per_report() {
        let mut sta = station(&two_group_caps());
        let mut report = report_at(&sta, 10, 7);
        if let Some(attempt) = report.attempts[0].as_mut() {
            attempt.count = 3;
        }
        sta.report_tx_status(&report, 1);
        assert_eq!(sta.tx_ok, 7);
        assert_eq!(sta.tx_err, 3);
        assert_eq!(sta.tx_retr, 2);
    }
}
