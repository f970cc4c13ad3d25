//! A single on-air transmission: the payload plus the three timestamps
//! ([`LoraMsg::xbeg`], [`LoraMsg::xpld`], [`LoraMsg::xend`]) every listener
//! on the [`crate::Medium`] is told about as the transmission progresses.

use sim_runtime::Tick;

use crate::rps::Rps;

/// LoRa preamble length used throughout the simulator (symbols), matching
/// the LoRaWAN default.
pub const PREAMBLE_SYMBOLS: u8 = 8;

/// Ticks per microsecond at the simulator's 32768Hz timebase, expressed as a
/// ratio to keep the conversion exact for the tick counts we care about.
const TICKS_PER_SEC: u64 = sim_runtime::clock::TICKS_PER_SEC;

fn us_to_ticks(us: f64) -> Tick {
    ((us * TICKS_PER_SEC as f64) / 1_000_000.0).round() as Tick
}

/// `dro = true` iff `(sf >= 11 and bw == 125k) or (sf == 12 and bw == 250k)`,
/// the low-datarate-optimize default a caller may override explicitly.
fn default_dro(rps: Rps) -> bool {
    match rps.sf() {
        None => false,
        Some(sf) => {
            let factor = sf.factor();
            (factor >= 11 && rps.bw() == lora_modulation::Bandwidth::_125KHz)
                || (factor == 12 && rps.bw() == lora_modulation::Bandwidth::_250KHz)
        }
    }
}

fn div_ceil_clamped(numerator: i64, denom: i64) -> i64 {
    if numerator <= 0 {
        0
    } else {
        (numerator + denom - 1) / denom
    }
}

/// Bit-exact airtime derivation (§4.E): returns `(preamble_us, payload_us)`.
fn airtime_us(rps: Rps, len: u8, npreamble: u8, dro: bool) -> (f64, f64) {
    let ts = rps.symbol_time_us();
    match rps.sf() {
        None => {
            let preamble = 8.0 * ts;
            let payload = (3.0 + 1.0 + 2.0 + len as f64) * ts;
            (preamble, payload)
        }
        Some(sf) => {
            let preamble = (npreamble as f64 + 4.25) * ts;
            let sf_n = sf.factor() as i64;
            let cr_denom = rps.cr().denom() as i64;
            let crc_term = if rps.crc() { 16 } else { 0 };
            let ih_term = if rps.ih() { 20 } else { 0 };
            let dro_term = if dro { 8 } else { 0 };
            let numerator = 8 * len as i64 - 4 * sf_n + 28 + crc_term - ih_term;
            let denom = 4 * sf_n - dro_term;
            let payload_symbols = 8 + div_ceil_clamped(numerator, denom) * cr_denom;
            let payload = payload_symbols as f64 * ts;
            (preamble, payload)
        }
    }
}

/// A single LoRa transmission, identified by its originator (`src`, an
/// opaque id assigned by whatever peripheral/session initiated it) and
/// described fully by `freq`/`rps`/payload bytes.
#[derive(Debug, Clone)]
pub struct LoraMsg {
    pub src: u64,
    pub freq: u32,
    pub rps: Rps,
    pub payload: heapless::Vec<u8, 256>,
    /// Tick the preamble begins.
    pub xbeg: Tick,
    /// Tick the payload portion (after the preamble) begins.
    pub xpld: Tick,
    /// Tick the transmission fully completes.
    pub xend: Tick,
    /// Low-datarate-optimize flag actually used for this transmission's
    /// airtime, derived from `rps` unless the caller supplied one.
    pub dro: bool,
    /// Preamble length in symbols used for this transmission (default 8).
    pub npreamble: u8,
    /// Transmit power in dBm, set by the originating Radio.
    pub xpow: f32,
    /// Receive signal strength, annotated by a listener (e.g. the gateway)
    /// once the message arrives; `None` until then.
    pub rssi: Option<f32>,
    /// Signal-to-noise ratio, annotated alongside `rssi`.
    pub snr: Option<f32>,
}

impl LoraMsg {
    /// Build a message starting at `xbeg` with the default 8-symbol preamble
    /// and an auto-derived low-datarate-optimize flag, deriving `xpld`/`xend`
    /// from the bit-exact airtime formula.
    pub fn new(src: u64, freq: u32, rps: Rps, payload: &[u8], xbeg: Tick) -> Self {
        Self::with_params(src, freq, rps, payload, xbeg, PREAMBLE_SYMBOLS, None)
    }

    /// Build a message with an explicit preamble length and/or
    /// low-datarate-optimize override; `dro = None` derives it from `rps`
    /// per §4.E's rule.
    pub fn with_params(
        src: u64,
        freq: u32,
        rps: Rps,
        payload: &[u8],
        xbeg: Tick,
        npreamble: u8,
        dro: Option<bool>,
    ) -> Self {
        let dro = dro.unwrap_or_else(|| default_dro(rps));
        let (preamble_us, payload_us) = airtime_us(rps, payload.len() as u8, npreamble, dro);

        let mut buf = heapless::Vec::new();
        let _ = buf.extend_from_slice(payload);

        LoraMsg {
            src,
            freq,
            rps,
            payload: buf,
            xbeg,
            xpld: xbeg + us_to_ticks(preamble_us),
            xend: xbeg + us_to_ticks(preamble_us + payload_us),
            dro,
            npreamble,
            xpow: 0.0,
            rssi: None,
            snr: None,
        }
    }

    /// Returns `self` with the transmit power set, for the Radio peripheral
    /// to record what register value drove a given transmission.
    pub fn with_xpow(mut self, xpow: f32) -> Self {
        self.xpow = xpow;
        self
    }

    /// Fills `rssi`/`snr` from `xpow` (`rssi = xpow - 50`, `snr = 10`) unless
    /// already set, per the Universal Gateway's uplink annotation rule.
    pub fn annotate_rssi_snr(&mut self) {
        if self.rssi.is_none() {
            self.rssi = Some(self.xpow - 50.0);
        }
        if self.snr.is_none() {
            self.snr = Some(10.0);
        }
    }

    pub fn duration_ticks(&self) -> Tick {
        self.xend - self.xbeg
    }

    /// Whether `self` and `other` overlap in time on the same frequency,
    /// regardless of Rps (a collision candidate, per §8's Testable Property
    /// about two transmitters on one frequency).
    pub fn overlaps(&self, other: &LoraMsg) -> bool {
        self.freq == other.freq && self.xbeg < other.xend && other.xbeg < self.xend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

    #[test]
    fn timestamps_are_monotonic() {
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hello", 100);
        assert!(msg.xbeg < msg.xpld);
        assert!(msg.xpld < msg.xend);
    }

    #[test]
    fn overlap_requires_same_frequency() {
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let a = LoraMsg::new(1, 868_100_000, rps, b"hello", 0);
        let b = LoraMsg::new(2, 868_300_000, rps, b"hello", 0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn longer_preamble_lengthens_airtime() {
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let short = LoraMsg::with_params(1, 868_100_000, rps, b"hello", 0, 8, Some(false));
        let long = LoraMsg::with_params(1, 868_100_000, rps, b"hello", 0, 16, Some(false));
        assert!(long.xpld > short.xpld);
        assert_eq!(short.npreamble, 8);
        assert_eq!(long.npreamble, 16);
    }

    #[test]
    fn dro_defaults_on_for_sf11_at_125khz() {
        let rps = Rps::new(SpreadingFactor::_11, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hello", 0);
        assert!(msg.dro);
    }

    #[test]
    fn fsk_rps_derives_airtime_without_a_spreading_factor() {
        let rps = Rps::new_fsk(true, false);
        let msg = LoraMsg::new(1, 868_100_000, rps, b"hello", 0);
        assert!(msg.xbeg < msg.xpld);
        assert!(msg.xpld < msg.xend);
    }
}
