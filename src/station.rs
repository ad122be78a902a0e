//! Per-peer rate-control state.
//!
//! [`HtStation`] holds the full decision state for one HT peer:
//! capability-derived group support, per-rate statistics, the current
//! and snapshot selections, the periodic stats aggregator, directional
//! group transitions, retry-chain budgeting and candidate-set
//! production. The modulation-index and stream/group controllers live
//! in their own modules but operate on this state.
//!
//! Single-writer contract: the host must serialize
//! [`HtStation::report_tx_status`] and [`HtStation::select_rates`] per
//! station. Distinct stations share nothing and may be driven
//! concurrently. No call blocks, performs I/O or allocates; all loops
//! are bounded by the fixed 12-group × 8-rate table.

use crate::config::RateAdaptConfig;
use crate::error::{RateError, RateResult};
use crate::fixed::{ewma, frac, trunc};
use crate::mcs::{self, GROUP_COUNT, GROUP_RATES, MCS_GROUPS};
use crate::report::{
    PhyTiming, RateCandidate, RateDecision, RateSet, StationCaps, TxStatusReport, MAX_RATE_SLOTS,
};
use crate::stats::{GroupData, RateStats};

/// Direction of an in-flight stream/group probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDirection {
    Upgrade,
    Downgrade,
}

/// Direction cooldown: armed by a failed stream/group probe, cleared
/// by the periodic reset epoch. While armed, transitions in that
/// direction stay blocked.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cooldown {
    armed: bool,
}

impl Cooldown {
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn clear(&mut self) {
        self.armed = false;
    }

    pub fn active(&self) -> bool {
        self.armed
    }
}

/// Rate-control state for one HT peer.
#[derive(Debug, Clone, Default)]
pub struct HtStation {
    pub(crate) config: RateAdaptConfig,

    /// Per-frame overhead, µs.
    pub(crate) overhead: u32,
    pub(crate) overhead_rtscts: u32,

    /// Per-group runtime state and statistics.
    pub(crate) groups: [GroupData; GROUP_COUNT],

    /// Current selection.
    pub(crate) cur_group: usize,
    pub(crate) cur_ridx: usize,
    pub(crate) cur_streams: u32,

    /// Pre-probe snapshot for the modulation controller.
    pub(crate) last_ridx: usize,
    pub(crate) last_streams: u32,
    /// Throughput of the selected cell at the previous epoch.
    pub(crate) last_tp: u32,
    /// Long-horizon EWMA of the selected cell's throughput.
    pub(crate) avg_tp: u32,

    /// Rollback snapshot for the stream/group controller.
    pub(crate) last_group: usize,
    pub(crate) elast_tp: u32,
    /// Instantaneous throughput estimate of the current cell.
    pub(crate) cur_tp: u32,

    /// Consecutive won modulation probes; multiplicative mode when > 1.
    pub(crate) consecutive: u32,
    /// Consecutive severely-degraded epochs.
    pub(crate) successive: u32,
    /// Failed probes since the last adaptive epoch.
    pub(crate) oscillations: u32,
    /// Adaptive re-evaluation interval, ticks.
    pub(crate) time_interval: u64,
    pub(crate) multiplicative: bool,

    /// A modulation-index probe is in flight.
    pub(crate) probing_mod: bool,
    /// A stream/group probe is in flight.
    pub(crate) probing_enh: bool,
    pub(crate) enh_probe_dir: Option<ProbeDirection>,
    /// Cooldowns armed by failed stream/group probes.
    pub(crate) up_bad: Cooldown,
    pub(crate) down_bad: Cooldown,

    /// Prefer staying on 40 MHz while downgrading streams.
    pub(crate) skip_narrow: bool,

    /// Per-epoch delivery counters.
    pub(crate) tx_ok: u32,
    pub(crate) tx_err: u32,
    pub(crate) tx_retr: u32,

    /// AMPDU-level stream failure/success streaks.
    pub(crate) stream_failure: u32,
    pub(crate) stream_success: u32,

    /// AMPDU accumulators for the current epoch.
    pub(crate) ampdu_len: u32,
    pub(crate) ampdu_packets: u32,
    /// EWMA average AMPDU length, Q16.
    pub(crate) avg_ampdu_len: u32,

    /// Global champions, flat (group * 8 + rate) indices.
    pub(crate) max_tp_rate: usize,
    pub(crate) max_tp_rate2: usize,
    pub(crate) max_prob_rate: usize,

    /// Epoch stamps, caller ticks.
    pub(crate) stats_update: u64,
    pub(crate) stats_update_reset: u64,
    pub(crate) stats_update_adaptive: u64,

    /// Sampling budget bookkeeping.
    pub(crate) sample_count: u32,
    pub(crate) sample_wait: u32,
    pub(crate) sample_tries: u32,
    pub(crate) sample_packets: u32,
    /// Monotonic packet counter; wraps explicitly to 0.
    pub(crate) total_packets: u32,
}

impl HtStation {
    /// Create state for a peer from its capability snapshot.
    ///
    /// Returns [`RateError::NoHtSupport`] when no MCS group is usable;
    /// the peer then belongs to the host's legacy algorithm.
    pub fn new(
        caps: &StationCaps,
        timing: PhyTiming,
        config: RateAdaptConfig,
        now: u64,
    ) -> RateResult<Self> {
        config.validate()?;
        let mut sta = Self {
            config,
            ..Default::default()
        };
        sta.update_caps(caps, timing, now)?;
        Ok(sta)
    }

    /// Reprocess a capability snapshot (capability-change event).
    ///
    /// Fully resets the station: statistics, streaks, probes and
    /// cooldowns all start over, and the selection moves to the
    /// highest supported group.
    pub fn update_caps(
        &mut self,
        caps: &StationCaps,
        timing: PhyTiming,
        now: u64,
    ) -> RateResult<()> {
        *self = Self {
            config: self.config.clone(),
            ..Default::default()
        };
        self.overhead = timing.overhead;
        self.overhead_rtscts = timing.overhead_rtscts;
        self.stats_update = now;
        self.stats_update_reset = now;
        self.stats_update_adaptive = now;
        self.avg_ampdu_len = frac(1, 1);

        // with multi-rate retry, sample more on the first attempt,
        // without delay
        if self.config.has_mrr {
            self.sample_count = 16;
            self.sample_wait = 0;
        } else {
            self.sample_count = 8;
            self.sample_wait = 8;
        }
        self.sample_tries = 4;

        let mut n_supported = 0;
        for (i, group) in MCS_GROUPS.iter().enumerate() {
            let req = group.requirement();
            let satisfied = (!req.sgi_20 || caps.short_gi_20)
                && (!req.sgi_40 || caps.short_gi_40)
                && (!req.width_40 || caps.width_40);
            if !satisfied {
                continue;
            }
            self.groups[i].supported = caps.rx_mask[group.streams as usize - 1];
            if self.groups[i].supported != 0 {
                n_supported += 1;
            }
        }
        if n_supported == 0 {
            return Err(RateError::NoHtSupport);
        }

        let group = self.highest_group();
        self.cur_group = group;
        self.last_group = group;
        self.cur_streams = MCS_GROUPS[group].streams;
        self.cur_ridx = self.clamp_supported(group, GROUP_RATES - 1);
        self.last_ridx = self.cur_ridx;
        self.last_streams = self.cur_streams;
        self.skip_narrow = true;
        self.time_interval = self.config.reset_interval;
        Ok(())
    }

    /// MCS group of the current selection.
    pub fn current_group(&self) -> usize {
        self.cur_group
    }

    /// In-group rate index of the current selection.
    pub fn current_rate(&self) -> usize {
        self.cur_ridx
    }

    /// Stream count of the current selection.
    pub fn current_streams(&self) -> u32 {
        self.cur_streams
    }

    /// Read-only view of a group's runtime state, for diagnostics.
    pub fn group_data(&self, group: usize) -> &GroupData {
        &self.groups[group]
    }

    /// Ingest a transmission-status report. `now` is the host's
    /// monotonic tick.
    pub fn report_tx_status(&mut self, report: &TxStatusReport, now: u64) {
        let ampdu_len = report.ampdu_len.max(1);
        let ack_len = report.ampdu_ack_len.min(ampdu_len);

        self.ampdu_packets += 1;
        self.ampdu_len += ampdu_len;

        if self.sample_wait == 0 && self.sample_tries == 0 && self.sample_count > 0 {
            self.sample_wait = 16 + 2 * trunc(self.avg_ampdu_len);
            self.sample_tries = 2;
            self.sample_count -= 1;
        }
        if report.probe {
            self.sample_packets += ampdu_len;
        }

        // credit attempts along the chain; only the last rate actually
        // tried gets the successes
        for i in 0..report.attempts.len() {
            let attempt = match report.attempts[i] {
                Some(a) if a.count > 0 => a,
                _ => break,
            };
            let last = i + 1 == report.attempts.len()
                || report.attempts[i + 1].map_or(true, |next| next.count == 0);
            let group = mcs::group_index(attempt.streams, attempt.flags);
            let cell = &mut self.groups[group].rates[attempt.rate_idx % GROUP_RATES];
            if last {
                cell.success += ack_len;
            }
            cell.attempts += attempt.count * ampdu_len;
        }

        self.check_enhancement_index(report, ampdu_len, ack_len);

        if now >= self.stats_update + self.config.update_interval {
            self.update_stats(now);
        }
        if now >= self.stats_update_reset + self.config.reset_interval {
            self.up_bad.clear();
            self.down_bad.clear();
            self.stats_update_reset = now;
        }
        if now >= self.stats_update_adaptive + self.time_interval {
            self.oscillations = 0;
            self.stats_update_adaptive = now;
        }
    }

    /// Assemble the ordered candidate set for the next transmission.
    ///
    /// `send_lowest` is the host's send-at-lowest-rate condition
    /// (management traffic and the like); it delegates the packet to
    /// the legacy path.
    pub fn select_rates(&mut self, send_lowest: bool) -> RateDecision {
        if send_lowest {
            return RateDecision::Legacy;
        }

        let probe = self.probing_mod || self.probing_enh;
        let mut set = RateSet::default();

        let cur = self.cur_group * GROUP_RATES + self.cur_ridx;
        set.slots[0] = self.set_rate(cur, probe, false);

        let slots = self.config.max_rate_slots.min(MAX_RATE_SLOTS);
        if slots >= 2 {
            let lower = self.cur_group * GROUP_RATES + self.cur_ridx.saturating_sub(1);
            set.slots[1] = self.set_rate(lower, false, true);
        }
        if slots >= 3 {
            // safety net borrowed from the global statistics
            set.slots[2] = self.set_rate(self.max_prob_rate, false, true);
        }

        self.total_packets += 1;
        if self.total_packets == u32::MAX {
            self.total_packets = 0;
            self.sample_packets = 0;
        }
        RateDecision::Rates(set)
    }

    /// Periodic statistics roll and champion re-selection, run every
    /// `update_interval` ticks from [`Self::report_tx_status`].
    pub(crate) fn update_stats(&mut self, now: u64) {
        if self.ampdu_packets > 0 {
            self.avg_ampdu_len = ewma(
                self.avg_ampdu_len,
                frac(self.ampdu_len, self.ampdu_packets),
                self.config.ewma_level,
            );
            self.ampdu_len = 0;
            self.ampdu_packets = 0;
        }

        self.sample_count = 0;
        self.max_tp_rate = 0;
        self.max_tp_rate2 = 0;
        self.max_prob_rate = 0;

        let overhead = self.overhead;
        let avg_ampdu = self.avg_ampdu_len;
        let level = self.config.ewma_level;

        for g in 0..GROUP_COUNT {
            if self.groups[g].supported == 0 {
                continue;
            }
            self.sample_count += 1;

            self.groups[g].max_tp_rate = 0;
            self.groups[g].max_tp_rate2 = 0;
            self.groups[g].max_prob_rate = 0;

            let mut best_prob = 0u32;
            let mut best_prob_tp = 0u32;
            let mut best_tp = 0u32;
            let mut best_tp2 = 0u32;

            for i in 0..GROUP_RATES {
                if self.groups[g].supported & (1 << i) == 0 {
                    continue;
                }
                let duration = MCS_GROUPS[g].duration[i];
                let cell = &mut self.groups[g].rates[i];
                cell.retry_updated = false;
                cell.update_ewma(level);
                cell.update_throughput(duration, overhead, avg_ampdu);
                let tp = cell.cur_tp;
                let prob = cell.probability;

                if tp == 0 {
                    continue;
                }
                // the lowest rate of a single-stream group is a
                // safety rate, not a throughput candidate
                if i == 0 && MCS_GROUPS[g].streams == 1 {
                    continue;
                }

                let mut index = g * GROUP_RATES + i;

                if (tp > best_prob_tp && prob > frac(3, 4)) || prob > best_prob {
                    self.groups[g].max_prob_rate = index;
                    best_prob = prob;
                    best_prob_tp = tp;
                }

                if tp > best_tp {
                    std::mem::swap(&mut index, &mut self.groups[g].max_tp_rate);
                    best_tp = tp;
                }
                // the displaced previous best competes for runner-up
                if index >= self.groups[g].max_tp_rate {
                    continue;
                }
                let displaced_tp = self.stats_at(index).cur_tp;
                if displaced_tp > best_tp2 {
                    self.groups[g].max_tp_rate2 = index;
                    best_tp2 = displaced_tp;
                }
            }
        }

        // global champions: only single-stream groups may win the
        // best-probability slot, as a robustness floor under strong
        // fluctuation
        let mut best_prob_tp = 0u32;
        let mut best_tp = 0u32;
        let mut best_tp2 = 0u32;
        for g in 0..GROUP_COUNT {
            if self.groups[g].supported == 0 {
                continue;
            }
            let prob_idx = self.groups[g].max_prob_rate;
            let tp_idx = self.groups[g].max_tp_rate;
            let tp2_idx = self.groups[g].max_tp_rate2;

            let tp = self.stats_at(prob_idx).cur_tp;
            if best_prob_tp < tp && MCS_GROUPS[g].streams == 1 {
                self.max_prob_rate = prob_idx;
                best_prob_tp = tp;
            }
            let tp = self.stats_at(tp_idx).cur_tp;
            if best_tp < tp {
                self.max_tp_rate = tp_idx;
                best_tp = tp;
            }
            let tp = self.stats_at(tp2_idx).cur_tp;
            if best_tp2 < tp {
                self.max_tp_rate2 = tp2_idx;
                best_tp2 = tp;
            }
        }

        // probe roughly half of the available rates per interval
        self.sample_count *= 4;

        self.check_modulation_index();
        self.stats_update = now;
        self.stats_update_adaptive = now;
    }

    /// Statistics cell for a flat (group * 8 + rate) index.
    pub(crate) fn stats_at(&self, index: usize) -> &RateStats {
        &self.groups[index / GROUP_RATES].rates[index % GROUP_RATES]
    }

    /// Move to the first supported group above the current one with at
    /// least the current stream count. Never narrows a 40 MHz
    /// selection. Returns the settled group index.
    pub fn upgrade_stream(&mut self) -> usize {
        let orig = self.cur_group;
        for group in orig + 1..GROUP_COUNT {
            if self.groups[group].supported == 0 {
                continue;
            }
            if MCS_GROUPS[group].streams < MCS_GROUPS[orig].streams {
                continue;
            }
            if !MCS_GROUPS[group].flags.width_40 && MCS_GROUPS[orig].flags.width_40 {
                continue;
            }
            tracing::debug!(from = orig, to = group, "upgrade stream");
            self.switch_group(group);
            return group;
        }
        orig
    }

    /// Move to the first supported group above the current one with
    /// exactly the current stream count (GI/width toggle only).
    pub fn upgrade_group(&mut self) -> usize {
        let orig = self.cur_group;
        for group in orig + 1..GROUP_COUNT {
            if self.groups[group].supported == 0 {
                continue;
            }
            if MCS_GROUPS[group].streams != MCS_GROUPS[orig].streams {
                continue;
            }
            tracing::debug!(from = orig, to = group, "upgrade group");
            self.switch_group(group);
            return group;
        }
        orig
    }

    /// Move to the first supported group below the current one with at
    /// most the current stream count. While `skip_narrow` holds, a
    /// 40 MHz selection refuses 20 MHz-only candidates.
    pub fn downgrade_stream(&mut self) -> usize {
        let orig = self.cur_group;
        for group in (0..orig).rev() {
            if self.groups[group].supported == 0 {
                continue;
            }
            if MCS_GROUPS[group].streams > MCS_GROUPS[orig].streams {
                continue;
            }
            if self.skip_narrow
                && !MCS_GROUPS[group].flags.width_40
                && MCS_GROUPS[orig].flags.width_40
            {
                tracing::debug!(candidate = group, "keep wide channel, skipping 20 MHz group");
                continue;
            }
            tracing::debug!(from = orig, to = group, "downgrade stream");
            self.switch_group(group);
            return group;
        }
        orig
    }

    /// Move to the first supported group below the current one with
    /// exactly the current stream count (GI/width toggle only).
    pub fn downgrade_group(&mut self) -> usize {
        let orig = self.cur_group;
        for group in (0..orig).rev() {
            if self.groups[group].supported == 0 {
                continue;
            }
            if MCS_GROUPS[group].streams != MCS_GROUPS[orig].streams {
                continue;
            }
            tracing::debug!(from = orig, to = group, "downgrade group");
            self.switch_group(group);
            return group;
        }
        orig
    }

    /// Change in-group rate index within the current group. The new
    /// cell starts from a clean slate.
    pub(crate) fn apply_rate(&mut self, ridx: usize, streams: u32) {
        self.cur_ridx = self.clamp_supported(self.cur_group, ridx);
        self.cur_streams = streams;
        self.groups[self.cur_group].rates[self.cur_ridx].reset();
    }

    /// Change MCS group, keeping group and stream count consistent and
    /// the rate index on a supported cell.
    pub(crate) fn switch_group(&mut self, group: usize) {
        self.cur_group = group;
        self.cur_streams = MCS_GROUPS[group].streams;
        self.cur_ridx = self.clamp_supported(group, self.cur_ridx);
        self.groups[group].rates[self.cur_ridx].reset();
    }

    /// Highest supported group, for the initial selection.
    fn highest_group(&self) -> usize {
        (0..GROUP_COUNT)
            .rev()
            .find(|&g| self.groups[g].supported != 0)
            .unwrap_or(0)
    }

    /// Highest supported rate index of `group` not above `ridx`, or
    /// failing that the lowest supported one above it.
    fn clamp_supported(&self, group: usize, ridx: usize) -> usize {
        let mask = self.groups[group].supported;
        (0..=ridx)
            .rev()
            .find(|&i| mask & (1 << i) != 0)
            .or_else(|| (ridx..GROUP_RATES).find(|&i| mask & (1 << i) != 0))
            .unwrap_or(ridx)
    }

    /// Fill one candidate slot for a flat rate index, computing (or
    /// reusing) its retry budget.
    fn set_rate(&mut self, index: usize, sample: bool, rtscts: bool) -> RateCandidate {
        let g = index / GROUP_RATES;
        let r = index % GROUP_RATES;
        if !self.groups[g].rates[r].retry_updated {
            self.calc_retransmit(index);
        }
        let mr = &self.groups[g].rates[r];
        let tries = if sample {
            1
        } else if mr.probability < frac(20, 100) {
            // fail fast on a rate that is unlikely to deliver
            2
        } else if rtscts {
            mr.retry_count_rtscts
        } else {
            mr.retry_count
        };
        let group = &MCS_GROUPS[g];
        RateCandidate {
            group: g,
            rate_idx: r,
            mcs: (r + (group.streams as usize - 1) * GROUP_RATES) as u8,
            flags: group.flags,
            use_rts_cts: rtscts,
            tries,
        }
    }

    /// Compute how many retries (plain and RTS/CTS-protected) fit the
    /// segment budget for a rate, simulating binary-exponential
    /// backoff.
    fn calc_retransmit(&mut self, index: usize) {
        let cw_min = self.config.cw_min;
        let cw_max = self.config.cw_max;
        let max_retry = self.config.max_retry;
        let segment_size = self.config.segment_size;
        let overhead = self.overhead;
        let overhead_rtscts = self.overhead_rtscts;
        let ampdu_len = trunc(self.avg_ampdu_len).max(1);
        let t_slot = 9u32;

        let tx_time_data = mcs::duration_of(index) * ampdu_len;
        let mr = &mut self.groups[index / GROUP_RATES].rates[index % GROUP_RATES];

        if mr.probability < frac(1, 10) {
            // a near-certain failure is not worth retrying
            mr.retry_count = 1;
            mr.retry_count_rtscts = 1;
            return;
        }

        mr.retry_count = 2;
        mr.retry_count_rtscts = 2;
        mr.retry_updated = true;

        // contention time for the first two tries
        let mut cw = cw_min;
        let mut ctime = (t_slot * cw) >> 1;
        cw = ((cw << 1) | 1).min(cw_max);
        ctime += (t_slot * cw) >> 1;
        cw = ((cw << 1) | 1).min(cw_max);

        let mut tx_time = ctime + 2 * (overhead + tx_time_data);
        let mut tx_time_rtscts = ctime + 2 * (overhead_rtscts + tx_time_data);

        // see how many more tries fit inside the segment budget; the
        // RTS/CTS chain is tracked in parallel
        loop {
            let ctime = (t_slot * cw) >> 1;
            cw = ((cw << 1) | 1).min(cw_max);

            tx_time += ctime + overhead + tx_time_data;
            tx_time_rtscts += ctime + overhead_rtscts + tx_time_data;

            if tx_time_rtscts < segment_size {
                mr.retry_count_rtscts += 1;
            }
            if tx_time >= segment_size {
                break;
            }
            mr.retry_count += 1;
            if mr.retry_count >= max_retry {
                break;
            }
        }
    }
}

/// Tagged per-peer rate-control entry: HT peers run the adaptation
/// engine, everything else belongs to the host's legacy algorithm.
#[derive(Debug, Clone)]
pub enum StaRateControl {
    /// Peer with usable HT support.
    Ht(Box<HtStation>),
    /// Peer the host's legacy (non-HT) rate algorithm owns.
    Legacy,
}

impl StaRateControl {
    /// Build from a capability snapshot; peers exposing no usable MCS
    /// group get the legacy tag instead of an error.
    pub fn new(
        caps: &StationCaps,
        timing: PhyTiming,
        config: RateAdaptConfig,
        now: u64,
    ) -> RateResult<Self> {
        match HtStation::new(caps, timing, config, now) {
            Ok(sta) => Ok(Self::Ht(Box::new(sta))),
            Err(RateError::NoHtSupport) => Ok(Self::Legacy),
            Err(e) => Err(e),
        }
    }
}
