use lora_modulation::{Bandwidth, SpreadingFactor};

use crate::{Datarate, Region};

const fn dr(sf: SpreadingFactor, bw: Bandwidth, max_mac_payload_size: u8) -> Option<Datarate> {
    Some(Datarate { spreading_factor: sf, bandwidth: bw, max_mac_payload_size })
}

const JOIN_CHANNELS: [u32; 3] = [868_100_000, 868_300_000, 868_500_000];

const DATARATES: [Option<Datarate>; 7] = [
    dr(SpreadingFactor::_12, Bandwidth::_125KHz, 59),
    dr(SpreadingFactor::_11, Bandwidth::_125KHz, 59),
    dr(SpreadingFactor::_10, Bandwidth::_125KHz, 59),
    dr(SpreadingFactor::_9, Bandwidth::_125KHz, 123),
    dr(SpreadingFactor::_8, Bandwidth::_125KHz, 230),
    dr(SpreadingFactor::_7, Bandwidth::_125KHz, 230),
    dr(SpreadingFactor::_7, Bandwidth::_250KHz, 250),
];

/// EU863-870 (EU868) regional parameters, trimmed to the three default join
/// channels and fixed RX2 the simulator's LNS needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eu868;

impl Region for Eu868 {
    fn join_channels(&self) -> &'static [u32] {
        &JOIN_CHANNELS
    }

    fn datarates(&self) -> &'static [Option<Datarate>] {
        &DATARATES
    }

    fn rx2(&self) -> (u32, u8) {
        (869_525_000, 0)
    }

    fn is_uplink_channel(&self, freq: u32) -> bool {
        JOIN_CHANNELS.contains(&freq)
    }

    fn max_eirp(&self) -> f32 {
        16.0
    }
}
