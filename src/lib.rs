//! # HT Link-Rate Adaptation Engine
//!
//! This crate implements a closed-loop transmit-rate adaptation
//! algorithm for 802.11n (HT) links. It selects the MCS group (spatial
//! streams, guard interval, channel width) and the modulation rate
//! within the group from observed per-rate delivery statistics, and
//! produces an ordered multi-rate retry set for each transmission.
//!
//! ## Overview
//!
//! The engine is a pure state machine: the host driver feeds it
//! transmission-status reports and capability snapshots and reads back
//! candidate rate sets. It owns no timers, sockets or frames. Two
//! controllers act on two timescales:
//!
//! - **Modulation index**: AIMD control of the in-group rate, run at
//!   every periodic statistics aggregation, probing upward while the
//!   current rate keeps up with its own long-horizon average.
//! - **Stream/group enhancement**: per-report control of the MCS group,
//!   reacting to AMPDU failure streaks and raw success ratios with
//!   probe-and-revert group transitions.
//!
//! ## Control Flow
//!
//! ```text
//! TX status → per-rate windows → EWMA aggregation → modulation index
//!          └→ streak / ratio classification → group probe / revert
//! next TX  ← retry-chain budget ← candidate set (cur, cur-1, robust)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use linkrate::mcs::MCS_GROUPS;
//! use linkrate::{
//!     HtStation, PhyTiming, RateAdaptConfig, RateDecision, StationCaps,
//!     TxRateAttempt, TxStatusReport,
//! };
//!
//! let caps = StationCaps {
//!     rx_mask: [0xff, 0xff, 0x00],
//!     short_gi_20: false,
//!     short_gi_40: false,
//!     width_40: false,
//! };
//! let timing = PhyTiming { overhead: 120, overhead_rtscts: 240 };
//! let mut sta = HtStation::new(&caps, timing, RateAdaptConfig::default(), 0)?;
//!
//! // one acknowledged frame at the current selection
//! let attempt = TxRateAttempt {
//!     streams: sta.current_streams(),
//!     rate_idx: sta.current_rate(),
//!     flags: MCS_GROUPS[sta.current_group()].flags,
//!     count: 1,
//! };
//! sta.report_tx_status(&TxStatusReport::mpdu(attempt, true), 1);
//!
//! match sta.select_rates(false) {
//!     RateDecision::Rates(set) => assert!(set.slots[0].tries > 0),
//!     RateDecision::Legacy => unreachable!(),
//! }
//! # Ok::<(), linkrate::RateError>(())
//! ```

pub mod config;
pub mod error;
pub mod fixed;
pub mod mcs;
pub mod report;
pub mod station;
pub mod stats;

mod enhancement;
mod modulation;

pub use config::RateAdaptConfig;
pub use error::{RateError, RateResult};
pub use report::{
    PhyTiming, RateCandidate, RateDecision, RateSet, StationCaps, TxRateAttempt, TxStatusReport,
    MAX_RATE_SLOTS,
};
pub use station::{HtStation, StaRateControl};
