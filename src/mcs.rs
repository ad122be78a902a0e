//! Static MCS group and transmit-duration table.
//!
//! HT rates are organized into groups of 8 modulation rates, one group
//! per (spatial streams × guard interval × channel width) combination:
//! streams 1..=3 with all four GI/width variants gives 12 groups. Each
//! group carries the time in microseconds to send an average 1200-byte
//! packet at each of its rates, precomputed from the PHY
//! bits-per-symbol constants. The table is process-wide, immutable and
//! shared by reference across all station instances.

use serde::{Deserialize, Serialize};

/// Modulation rates per MCS group.
pub const GROUP_RATES: usize = 8;

/// Maximum spatial streams covered by the table.
pub const MAX_STREAMS: usize = 3;

/// GI/width variants per stream count.
pub const STREAM_GROUPS: usize = 4;

/// Total MCS groups.
pub const GROUP_COUNT: usize = MAX_STREAMS * STREAM_GROUPS;

/// Average packet size the duration table is computed for, in bytes.
const AVG_PKT_SIZE: u32 = 1200;

/// Bits in an average-sized packet.
const PKT_BITS: u32 = AVG_PKT_SIZE * 8;

/// Bits per OFDM symbol at each rate, 20 MHz channel, one stream.
const BPS_20: [u32; GROUP_RATES] = [26, 52, 78, 104, 156, 208, 234, 260];

/// Bits per OFDM symbol at each rate, 40 MHz channel, one stream.
const BPS_40: [u32; GROUP_RATES] = [54, 108, 162, 216, 324, 432, 486, 540];

/// Guard-interval and channel-width selection for a rate or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateFlags {
    /// Short guard interval (3.6 µs symbols instead of 4 µs).
    pub short_gi: bool,
    /// 40 MHz channel width.
    pub width_40: bool,
}

/// Station capabilities an MCS group requires before it can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupRequirement {
    /// Short GI at 20 MHz.
    pub sgi_20: bool,
    /// Short GI at 40 MHz.
    pub sgi_40: bool,
    /// 40 MHz channel width.
    pub width_40: bool,
}

/// One immutable MCS group: stream count, GI/width flags and the
/// per-rate transmit duration for an average packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McsGroup {
    /// Spatial streams (1..=3).
    pub streams: u32,
    /// Guard interval / channel width of every rate in the group.
    pub flags: RateFlags,
    /// Microseconds to transmit an average packet at each rate.
    pub duration: [u32; GROUP_RATES],
}

impl McsGroup {
    /// Capability bits a station must advertise to use this group.
    pub const fn requirement(&self) -> GroupRequirement {
        GroupRequirement {
            sgi_20: self.flags.short_gi && !self.flags.width_40,
            sgi_40: self.flags.short_gi && self.flags.width_40,
            width_40: self.flags.width_40,
        }
    }
}

/// Microseconds to send an average packet with `streams * bps` bits
/// per symbol. Short GI symbols take 3.6 µs, long GI 4 µs.
const fn mcs_duration(streams: u32, short_gi: bool, bps: u32) -> u32 {
    let syms = (PKT_BITS + streams * bps - 1) / (streams * bps);
    if short_gi {
        (syms * 18 + 4) / 5
    } else {
        syms * 4
    }
}

const fn mcs_group(streams: u32, short_gi: bool, width_40: bool) -> McsGroup {
    let bps = if width_40 { BPS_40 } else { BPS_20 };
    McsGroup {
        streams,
        flags: RateFlags { short_gi, width_40 },
        duration: [
            mcs_duration(streams, short_gi, bps[0]),
            mcs_duration(streams, short_gi, bps[1]),
            mcs_duration(streams, short_gi, bps[2]),
            mcs_duration(streams, short_gi, bps[3]),
            mcs_duration(streams, short_gi, bps[4]),
            mcs_duration(streams, short_gi, bps[5]),
            mcs_duration(streams, short_gi, bps[6]),
            mcs_duration(streams, short_gi, bps[7]),
        ],
    }
}

/// The process-wide MCS group table. Group index grows with stream
/// count; within a stream count the variant order is (long GI, 20),
/// (short GI, 20), (long GI, 40), (short GI, 40).
pub static MCS_GROUPS: [McsGroup; GROUP_COUNT] = [
    mcs_group(1, false, false),
    mcs_group(1, true, false),
    mcs_group(1, false, true),
    mcs_group(1, true, true),
    mcs_group(2, false, false),
    mcs_group(2, true, false),
    mcs_group(2, false, true),
    mcs_group(2, true, true),
    mcs_group(3, false, false),
    mcs_group(3, true, false),
    mcs_group(3, false, true),
    mcs_group(3, true, true),
];

/// Resolve the group index for a reported rate descriptor. A
/// descriptor no group matches is a diagnostic condition; the engine
/// degrades to group 0 rather than dropping the report.
pub fn group_index(streams: u32, flags: RateFlags) -> usize {
    for (i, group) in MCS_GROUPS.iter().enumerate() {
        if group.streams == streams && group.flags == flags {
            return i;
        }
    }
    tracing::warn!(
        streams,
        short_gi = flags.short_gi,
        width_40 = flags.width_40,
        "no MCS group matches rate descriptor, falling back to group 0"
    );
    0
}

/// Transmit duration for a flat (group * 8 + rate) index.
pub fn duration_of(index: usize) -> u32 {
    MCS_GROUPS[index / GROUP_RATES].duration[index % GROUP_RATES]
}
