//! Radio parameter set: spreading factor, bandwidth, coding rate, CRC and
//! implicit-header flags, and the IQ-inversion extension bit, packed
//! bit-exact into a single value so it can travel as one field on
//! [`crate::LoraMsg`] and be compared cheaply when a [`crate::Receiver`]
//! checks whether an incoming preamble matches what it's armed for.
//!
//! Layout (bit-exact, LSB first):
//!   bits 0..2  sf − 6, `0` means FSK
//!   bits 3..4  bandwidth index into `[125, 250, 500]` kHz
//!   bits 5..6  cr − 1, register values `1..4`
//!   bit 7      ¬crc
//!   bits 8..15 implicit-header flag, stored as a full byte
//!   bit 16     IQ-inverted (downlink)

use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};

const SF_MASK: u32 = 0x7;
const BW_SHIFT: u32 = 3;
const BW_MASK: u32 = 0x3;
const CR_SHIFT: u32 = 5;
const CR_MASK: u32 = 0x3;
const CRC_BIT: u32 = 1 << 7;
const IH_SHIFT: u32 = 8;
const IH_MASK: u32 = 0xff;
const IQINV_BIT: u32 = 1 << 16;

/// FSK symbol time, per §4.E: `Ts = 8/50000` seconds per byte, in microseconds.
const FSK_SYMBOL_TIME_US: f64 = 8.0 / 50_000.0 * 1_000_000.0;

/// A packed radio parameter set, mirroring the on-air Rps encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rps(u32);

impl Rps {
    /// Build a LoRa parameter set. `crc` and `ih` are the logical flags (the
    /// CRC bit is stored inverted on the wire, per the layout above); `ih`
    /// true means implicit header. IQ-inversion defaults to `false` — chain
    /// [`Self::with_iq_inv`] to set it.
    pub fn new(sf: SpreadingFactor, bw: Bandwidth, cr: CodingRate, crc: bool, ih: bool) -> Self {
        let mut value = sf_code(Some(sf)) as u32
            | ((bw_index(bw) as u32) << BW_SHIFT)
            | ((cr_index(cr) as u32) << CR_SHIFT);
        if !crc {
            value |= CRC_BIT;
        }
        if ih {
            value |= 1 << IH_SHIFT;
        }
        Rps(value)
    }

    /// Build an FSK parameter set (`sf` code `0`). Bandwidth/coding-rate bits
    /// are unused for FSK matching and left at `0`.
    pub fn new_fsk(crc: bool, ih: bool) -> Self {
        let mut value = 0u32;
        if !crc {
            value |= CRC_BIT;
        }
        if ih {
            value |= 1 << IH_SHIFT;
        }
        Rps(value)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        Rps(raw)
    }

    /// `None` means FSK (sf code `0`), per the layout's "0 means FSK" rule.
    pub fn sf(self) -> Option<SpreadingFactor> {
        sf_from_code((self.0 & SF_MASK) as u8)
    }

    pub fn is_fsk(self) -> bool {
        self.sf().is_none()
    }

    /// Bandwidth bits. Only meaningful when [`Self::is_fsk`] is `false`.
    pub fn bw(self) -> Bandwidth {
        bw_from_index(((self.0 >> BW_SHIFT) & BW_MASK) as u8)
    }

    /// Coding-rate bits. Only meaningful when [`Self::is_fsk`] is `false`.
    pub fn cr(self) -> CodingRate {
        cr_from_index(((self.0 >> CR_SHIFT) & CR_MASK) as u8)
    }

    /// Logical CRC-enabled flag (the wire bit is stored inverted).
    pub fn crc(self) -> bool {
        self.0 & CRC_BIT == 0
    }

    /// Implicit-header flag.
    pub fn ih(self) -> bool {
        (self.0 >> IH_SHIFT) & IH_MASK != 0
    }

    /// True if the IQINV extension bit is set.
    pub fn is_iq_inv(self) -> bool {
        self.0 & IQINV_BIT != 0
    }

    /// Returns a copy with the IQINV bit forced to `inv`.
    pub fn with_iq_inv(self, inv: bool) -> Self {
        if inv {
            Rps(self.0 | IQINV_BIT)
        } else {
            Rps(self.0 & !IQINV_BIT)
        }
    }

    /// `(sf, bw)` for a LoRa parameter set. Panics if [`Self::is_fsk`] — this
    /// workspace's region tables never classify FSK uplinks, so callers that
    /// reach here on a LoRaWAN data/join channel have already ruled it out.
    pub fn get_sf_bw(self) -> (SpreadingFactor, Bandwidth) {
        (self.sf().expect("get_sf_bw called on an FSK Rps"), self.bw())
    }

    /// Same on-air parameters regardless of the IQINV bit (two Rps values
    /// differing only by IQINV describe the same physical signal).
    pub fn same_phy(self, other: Rps) -> bool {
        (self.0 & !IQINV_BIT) == (other.0 & !IQINV_BIT)
    }

    /// True iff every field holds a value in the domain this layout
    /// documents (sf code `0..=6`, bw code `0..=2`, ih byte `0` or `1`; cr's
    /// 2-bit field and crc/iqinv's single bits are always in-domain).
    pub fn validate(self) -> bool {
        let sf_code = self.0 & SF_MASK;
        let bw_code = (self.0 >> BW_SHIFT) & BW_MASK;
        let ih_byte = (self.0 >> IH_SHIFT) & IH_MASK;
        sf_code <= 6 && bw_code <= 2 && ih_byte <= 1
    }

    pub fn sfbwstr(self) -> heapless::String<16> {
        let mut s = heapless::String::new();
        match self.sf() {
            Some(sf) => {
                let _ = core::fmt::write(&mut s, format_args!("SF{}BW{}", sf.factor(), self.bw().hz() / 1000));
            }
            None => {
                let _ = core::fmt::write(&mut s, format_args!("FSK"));
            }
        }
        s
    }

    /// Symbol duration in microseconds: `2^sf/bw` for LoRa, the fixed FSK
    /// byte time otherwise. Used to derive airtime (see [`crate::msg`]).
    pub fn symbol_time_us(self) -> f64 {
        match self.sf() {
            Some(sf) => (1u64 << sf.factor()) as f64 / self.bw().hz() as f64 * 1_000_000.0,
            None => FSK_SYMBOL_TIME_US,
        }
    }
}

fn sf_code(sf: Option<SpreadingFactor>) -> u8 {
    match sf {
        None => 0,
        Some(sf) => sf.factor() as u8 - 6,
    }
}

fn sf_from_code(code: u8) -> Option<SpreadingFactor> {
    match code {
        0 => None,
        1 => Some(SpreadingFactor::_7),
        2 => Some(SpreadingFactor::_8),
        3 => Some(SpreadingFactor::_9),
        4 => Some(SpreadingFactor::_10),
        5 => Some(SpreadingFactor::_11),
        _ => Some(SpreadingFactor::_12),
    }
}

fn bw_index(bw: Bandwidth) -> u8 {
    match bw {
        Bandwidth::_125KHz => 0,
        Bandwidth::_250KHz => 1,
        Bandwidth::_500KHz => 2,
        _ => panic!("Rps only encodes 125/250/500kHz, per the documented bit layout"),
    }
}

fn bw_from_index(i: u8) -> Bandwidth {
    match i {
        0 => Bandwidth::_125KHz,
        1 => Bandwidth::_250KHz,
        _ => Bandwidth::_500KHz,
    }
}

fn cr_index(cr: CodingRate) -> u8 {
    match cr {
        CodingRate::_4_5 => 0,
        CodingRate::_4_6 => 1,
        CodingRate::_4_7 => 2,
        CodingRate::_4_8 => 3,
    }
}

fn cr_from_index(i: u8) -> CodingRate {
    match i {
        0 => CodingRate::_4_5,
        1 => CodingRate::_4_6,
        2 => CodingRate::_4_7,
        _ => CodingRate::_4_8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn makes_rps_round_trips_through_the_five_getters() {
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_6, true, false);
        assert_eq!(rps.sf(), Some(SpreadingFactor::_7));
        assert_eq!(rps.bw(), Bandwidth::_125KHz);
        assert_eq!(rps.cr(), CodingRate::_4_6);
        assert!(rps.crc());
        assert!(!rps.ih());
        assert!(rps.validate());
    }

    #[test]
    fn crc_bit_is_stored_inverted_but_reads_back_logical() {
        let enabled = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let disabled = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, false, false);
        assert_eq!(enabled.raw() & 0x80, 0);
        assert_eq!(disabled.raw() & 0x80, 0x80);
        assert!(enabled.crc());
        assert!(!disabled.crc());
    }

    #[test]
    fn fsk_rps_uses_sf_code_zero_and_has_no_spreading_factor() {
        let rps = Rps::new_fsk(true, false);
        assert_eq!(rps.raw() & 0x7, 0);
        assert!(rps.is_fsk());
        assert_eq!(rps.sf(), None);
    }

    #[test]
    fn validate_rejects_out_of_domain_bit_patterns() {
        assert!(!Rps::from_raw(0b111).validate()); // sf code 7 is out of range
        assert!(!Rps::from_raw(0b11 << 3).validate()); // bw code 3 is out of range
        assert!(!Rps::from_raw(0xff << 8).validate()); // ih byte must be 0 or 1
    }

    #[test]
    fn iq_inv_bit_survives_round_trip() {
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false).with_iq_inv(true);
        assert!(rps.is_iq_inv());
        assert_eq!(rps.sf(), Some(SpreadingFactor::_7));
        assert_eq!(rps.bw(), Bandwidth::_125KHz);
    }

    #[test]
    fn same_phy_ignores_iq_inv() {
        let up = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        let down = up.with_iq_inv(true);
        assert!(up.same_phy(down));
        assert_ne!(up, down);
    }
}
