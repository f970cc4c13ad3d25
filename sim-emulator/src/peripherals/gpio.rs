//! Bit-banged GPIO: a 32-pin port with per-pin direction, drive value, and
//! pull configuration. Detects a pin firmware drives while it's also pulled
//! the opposite way, which in the original Python model is flagged as a
//! short circuit rather than silently resolved. Grounded in
//! `peripherals.py`'s `GPIO`; UUID carried over verbatim.

use uuid::{uuid, Uuid};

use crate::error::{EmulatorError, Result};
use crate::registry::{Peripheral, PeripheralHost};

const SVC_READ: u16 = 0;

pub struct Gpio {
    /// 1 = pin is driven as an output.
    outm: u32,
    /// Driven value for output pins.
    outv: u32,
    /// 1 = pin has a pull-up; only meaningful where `outm` is 0.
    pullup: u32,
    /// 1 = pin has a pull-down; only meaningful where `outm` is 0.
    pulldown: u32,
}

impl Gpio {
    pub const UUID: Uuid = uuid!("76d5885a-ff99-11ea-9aa3-cd4b514dc224");

    pub fn new() -> Self {
        Gpio { outm: 0, outv: 0, pullup: 0, pulldown: 0 }
    }

    fn update(&self) -> Result<u32> {
        let shorted = self.pullup & self.pulldown;
        if shorted != 0 {
            return Err(EmulatorError::GpioShortCircuit(shorted));
        }
        let floating = !self.outm & !self.pullup & !self.pulldown;
        let driven_in = (self.outm & self.outv) | (!self.outm & self.pullup);
        // floating pins read as whatever was last driven (held weakly high).
        Ok(driven_in | (floating & self.outv))
    }
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for Gpio {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.outm.to_le_bytes());
        out[4..8].copy_from_slice(&self.outv.to_le_bytes());
        out[8..12].copy_from_slice(&self.pullup.to_le_bytes());
        out[12..16].copy_from_slice(&self.pulldown.to_le_bytes());
        let inpv = self.update().unwrap_or(0);
        out[16..20].copy_from_slice(&inpv.to_le_bytes());
    }

    fn write_page(&mut self, data: &[u8]) {
        self.outm = u32::from_le_bytes(data[0..4].try_into().unwrap());
        self.outv = u32::from_le_bytes(data[4..8].try_into().unwrap());
        self.pullup = u32::from_le_bytes(data[8..12].try_into().unwrap());
        self.pulldown = u32::from_le_bytes(data[12..16].try_into().unwrap());
    }

    fn svc(&mut self, _host: &mut dyn PeripheralHost, fid: u16) -> Result<()> {
        match fid {
            SVC_READ => {
                self.update()?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_pin_reads_back_its_driven_value() {
        let mut gpio = Gpio::new();
        gpio.outm = 0b1;
        gpio.outv = 0b1;
        assert_eq!(gpio.update().unwrap() & 1, 1);
    }

    #[test]
    fn pullup_and_pulldown_on_the_same_pin_is_a_short() {
        let mut gpio = Gpio::new();
        gpio.pullup = 0b1;
        gpio.pulldown = 0b1;
        assert!(matches!(gpio.update(), Err(EmulatorError::GpioShortCircuit(_))));
    }

    #[test]
    fn input_pin_follows_its_pullup() {
        let mut gpio = Gpio::new();
        gpio.pullup = 0b1;
        assert_eq!(gpio.update().unwrap() & 1, 1);
    }
}
