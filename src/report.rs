//! Boundary types exchanged with the host driver.
//!
//! The engine owns no timers and parses no frames: the host feeds it
//! transmission-status reports and capability snapshots, and reads
//! back ordered candidate rate sets. Timestamps are a monotonic tick
//! value supplied by the host on every call.

use serde::{Deserialize, Serialize};

use crate::mcs::{RateFlags, MAX_STREAMS};

/// Rate slots a transmission descriptor can carry.
pub const MAX_RATE_SLOTS: usize = 4;

/// One attempted rate in a transmission-status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxRateAttempt {
    /// Spatial streams the attempt used.
    pub streams: u32,
    /// In-group rate index (0..=7).
    pub rate_idx: usize,
    /// Guard interval / channel width of the attempt.
    pub flags: RateFlags,
    /// Transmission attempts made at this rate.
    pub count: u32,
}

/// Delivery outcome for one (possibly aggregated) transmission.
#[derive(Debug, Clone)]
pub struct TxStatusReport {
    /// Attempted rates, most-preferred first. Processing stops at the
    /// first empty or zero-count slot.
    pub attempts: [Option<TxRateAttempt>; MAX_RATE_SLOTS],
    /// Subframes in the AMPDU (1 for a plain MPDU).
    pub ampdu_len: u32,
    /// Subframes acknowledged.
    pub ampdu_ack_len: u32,
    /// The transmission was a sampling/probe attempt.
    pub probe: bool,
}

impl TxStatusReport {
    /// Report for a single non-aggregated frame.
    pub fn mpdu(attempt: TxRateAttempt, acked: bool) -> Self {
        Self {
            attempts: [Some(attempt), None, None, None],
            ampdu_len: 1,
            ampdu_ack_len: acked as u32,
            probe: false,
        }
    }
}

/// One candidate rate for the next transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateCandidate {
    /// MCS group index.
    pub group: usize,
    /// In-group rate index (0..=7).
    pub rate_idx: usize,
    /// MCS index as signalled on the air:
    /// `rate_idx + (streams - 1) * 8`.
    pub mcs: u8,
    /// Guard interval / channel width.
    pub flags: RateFlags,
    /// Protect attempts with an RTS/CTS handshake.
    pub use_rts_cts: bool,
    /// Attempts to spend at this candidate; 0 marks the slot inactive.
    pub tries: u32,
}

impl RateCandidate {
    /// Whether this slot holds a usable candidate.
    pub fn is_active(&self) -> bool {
        self.tries > 0
    }
}

/// Ordered candidate set for the next transmission. Slots beyond the
/// device's rate-chain capability stay inactive.
#[derive(Debug, Clone, Default)]
pub struct RateSet {
    /// Candidates, primary first.
    pub slots: [RateCandidate; MAX_RATE_SLOTS],
}

/// Producer output: a concrete candidate set, or a delegation to the
/// host's legacy (non-HT) rate algorithm.
#[derive(Debug, Clone)]
pub enum RateDecision {
    /// Use these candidates for the next transmission.
    Rates(RateSet),
    /// The host's legacy algorithm picks the rate for this packet.
    Legacy,
}

/// Per-peer HT capability snapshot, delivered at init and on every
/// capability-change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationCaps {
    /// Supported-rate bitmask per stream count (index 0 = 1 stream).
    pub rx_mask: [u8; MAX_STREAMS],
    /// Short guard interval supported at 20 MHz.
    pub short_gi_20: bool,
    /// Short guard interval supported at 40 MHz.
    pub short_gi_40: bool,
    /// 40 MHz supported and the operating channel is 40 MHz wide.
    pub width_40: bool,
}

/// PHY frame-overhead timing in microseconds, computed by the host
/// from its frame-duration tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhyTiming {
    /// Per-frame overhead (preamble, IFS, ACK).
    pub overhead: u32,
    /// Per-frame overhead with the RTS/CTS exchange included.
    pub overhead_rtscts: u32,
}
