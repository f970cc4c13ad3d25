//! Simplified regional parameter tables: uplink channel plan, per-DR spreading
//! factor/bandwidth/max payload, and the RX1/RX2 downlink mapping used by the
//! gateway and LNS. Grounded in `lorawan-device`'s region tables
//! (`region/dynamic_channel_plans/eu868.rs`, `region/fixed_channel_plans/us915/datarates.rs`),
//! trimmed to what a host-side simulator's LNS needs rather than a real
//! end-device's full channel-plan state machine (ADR, duty cycle, beaconing
//! are out of scope).

use lora_modulation::{Bandwidth, SpreadingFactor};

mod eu868;
mod us915;

/// One entry of a region's data-rate table. `None` marks an unused/reserved
/// DR index (FSK and LR-FHSS rows are not modeled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datarate {
    pub spreading_factor: SpreadingFactor,
    pub bandwidth: Bandwidth,
    pub max_mac_payload_size: u8,
}

/// Error returned when a DR index or frequency falls outside a region's table.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum RegionError {
    #[error("data rate index {0} is not defined for this region")]
    UnknownDataRate(u8),
    #[error("frequency {0} Hz is not one of this region's uplink channels")]
    UnknownChannel(u32),
}

/// A region's static parameters: join channels, the full DR table, and the
/// RX1/RX2 downlink mapping rules.
pub trait Region {
    /// The channels a device may send a Join-Request on.
    fn join_channels(&self) -> &'static [u32];

    /// The DR table, indexed by DR number; `None` entries are reserved/unused.
    fn datarates(&self) -> &'static [Option<Datarate>];

    fn datarate(&self, dr: u8) -> Result<Datarate, RegionError> {
        self.datarates()
            .get(dr as usize)
            .copied()
            .flatten()
            .ok_or(RegionError::UnknownDataRate(dr))
    }

    /// The RX2 window's fixed frequency and data rate.
    fn rx2(&self) -> (u32, u8);

    /// RX1 downlink frequency for an uplink received on `up_freq`. Most
    /// regions echo the uplink channel back (frequency-equal RX1, per
    /// `up2dn_rx1` in the original gateway).
    fn rx1_freq(&self, up_freq: u32) -> Result<u32, RegionError> {
        if self.join_channels().contains(&up_freq) || self.is_uplink_channel(up_freq) {
            Ok(up_freq)
        } else {
            Err(RegionError::UnknownChannel(up_freq))
        }
    }

    fn is_uplink_channel(&self, freq: u32) -> bool;

    /// RX1 data rate given the uplink DR and `DLSettings.rx1_dr_offset`.
    fn rx1_dr(&self, up_dr: u8, offset: u8) -> Result<u8, RegionError> {
        let dr = up_dr.saturating_sub(offset);
        self.datarate(dr)?;
        Ok(dr)
    }

    /// The region's maximum allowed EIRP in dBm, used to stamp the Radio's
    /// transmit power field for downlinks the LNS originates (Join-Accept
    /// and data) rather than relaying an end device's own setting.
    fn max_eirp(&self) -> f32;

    /// The data rate index whose `(spreading_factor, bandwidth)` matches
    /// `sf`/`bw`, or `UnknownDataRate` if none of this region's rows do.
    fn dr_for_sf_bw(&self, sf: SpreadingFactor, bw: Bandwidth) -> Result<u8, RegionError> {
        self.datarates()
            .iter()
            .position(|d| matches!(d, Some(d) if d.spreading_factor == sf && d.bandwidth == bw))
            .map(|idx| idx as u8)
            .ok_or(RegionError::UnknownDataRate(0))
    }
}

pub use eu868::Eu868;
pub use us915::Us915;

static EU868: Eu868 = Eu868;
static US915: Us915 = Us915;

/// The regions a Session/Gateway can be configured with, as a closed enum so
/// a `Session` can store "which region" without owning a trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Eu868,
    Us915,
}

impl RegionKind {
    pub fn region(self) -> &'static dyn Region {
        match self {
            RegionKind::Eu868 => &EU868,
            RegionKind::Us915 => &US915,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RegionKind::Eu868 => "EU868",
            RegionKind::Us915 => "US915",
        }
    }

    pub const ALL: [RegionKind; 2] = [RegionKind::Eu868, RegionKind::Us915];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eu868_rx2_is_sf12bw125() {
        let (freq, dr) = Eu868.rx2();
        assert_eq!(freq, 869_525_000);
        let parms = Eu868.datarate(dr).unwrap();
        assert_eq!(parms.spreading_factor, SpreadingFactor::_12);
        assert_eq!(parms.bandwidth, Bandwidth::_125KHz);
    }

    #[test]
    fn us915_rx2_is_sf12bw500() {
        let (_, dr) = Us915.rx2();
        let parms = Us915.datarate(dr).unwrap();
        assert_eq!(parms.bandwidth, Bandwidth::_500KHz);
    }

    #[test]
    fn unknown_datarate_is_rejected() {
        assert!(matches!(Eu868.datarate(7), Err(RegionError::UnknownDataRate(7))));
    }
}
