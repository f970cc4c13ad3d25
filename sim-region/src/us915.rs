use lora_modulation::{Bandwidth, SpreadingFactor};

use crate::{Datarate, Region};

const fn dr(sf: SpreadingFactor, bw: Bandwidth, max_mac_payload_size: u8) -> Option<Datarate> {
    Some(Datarate { spreading_factor: sf, bandwidth: bw, max_mac_payload_size })
}

const JOIN_CHANNELS: [u32; 8] = [
    902_300_000, 902_500_000, 902_700_000, 902_900_000,
    903_100_000, 903_300_000, 903_500_000, 903_700_000,
];

const DATARATES: [Option<Datarate>; 14] = [
    dr(SpreadingFactor::_10, Bandwidth::_125KHz, 19),
    dr(SpreadingFactor::_9, Bandwidth::_125KHz, 61),
    dr(SpreadingFactor::_8, Bandwidth::_125KHz, 133),
    dr(SpreadingFactor::_7, Bandwidth::_125KHz, 250),
    dr(SpreadingFactor::_8, Bandwidth::_500KHz, 250),
    None, // DR5: LR-FHSS, not modeled
    None, // DR6: LR-FHSS, not modeled
    None, // DR7: RFU
    dr(SpreadingFactor::_12, Bandwidth::_500KHz, 61),
    dr(SpreadingFactor::_11, Bandwidth::_500KHz, 137),
    dr(SpreadingFactor::_10, Bandwidth::_500KHz, 250),
    dr(SpreadingFactor::_9, Bandwidth::_500KHz, 250),
    dr(SpreadingFactor::_8, Bandwidth::_500KHz, 250),
    dr(SpreadingFactor::_7, Bandwidth::_500KHz, 250),
];

/// US902-928 (US915) regional parameters, trimmed to the first upstream
/// sub-band (8 of the 64 fixed uplink channels) and fixed RX2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Us915;

impl Region for Us915 {
    fn join_channels(&self) -> &'static [u32] {
        &JOIN_CHANNELS
    }

    fn datarates(&self) -> &'static [Option<Datarate>] {
        &DATARATES
    }

    fn rx2(&self) -> (u32, u8) {
        (923_300_000, 8)
    }

    fn is_uplink_channel(&self, freq: u32) -> bool {
        JOIN_CHANNELS.contains(&freq)
    }

    fn max_eirp(&self) -> f32 {
        30.0
    }
}
