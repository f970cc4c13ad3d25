//! One emulated end device: a CPU core plus its Radio peripheral, wired to a
//! shared [`Scheduler`] and [`Medium`]. Mirrors `device.py`'s `Simulation`
//! class driving one Unicorn instance per simulated node.

use std::path::Path;
use std::sync::{Arc, Mutex};

use sim_emulator::{PeripheralCatalog, Simulation as Cpu};
use sim_medium::Medium;
use sim_runtime::Scheduler;

use crate::error::SimError;

/// Peripheral id the Radio is registered under in every device this facade
/// builds. Firmware images loaded through [`Device::load_hex`] are expected
/// to register their own radio at this pid via `SVC_PERIPH_REG`, matching
/// the builtin's UUID.
pub const RADIO_PID: u8 = 6;

pub struct Device {
    pub cpu: Cpu,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl Device {
    pub fn new(scheduler: Arc<Mutex<Scheduler>>, medium: Arc<Mutex<dyn Medium + Send>>) -> Result<Self, SimError> {
        let catalog = PeripheralCatalog::with_builtins();
        let mut cpu = Cpu::new(catalog)?;
        let radio = sim_emulator::peripherals::Radio::new(RADIO_PID, scheduler.clone(), medium);
        cpu.install_peripheral(RADIO_PID, Box::new(radio))?;
        Ok(Device { cpu, scheduler })
    }

    /// Load one Intel-HEX firmware image into FLASH, coalescing its records
    /// into segments via [`hexload`].
    pub fn load_hex(&mut self, path: &Path) -> Result<(), SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| SimError::Io { path: path.display().to_string(), source })?;
        let segments = hexload::load(&text)?;
        self.cpu.load_segments(&hexload::into_pairs(segments))?;
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), SimError> {
        self.cpu.reset()?;
        Ok(())
    }

    /// Run one cooperative slice: publish the scheduler's current ticks to
    /// the CPU, let time-driven peripherals react, then resume guest
    /// execution until its next SVC yield or WFI.
    pub fn step(&mut self) -> Result<(), SimError> {
        let ticks = self.scheduler.lock().unwrap().clock().ticks(false);
        self.cpu.set_ticks(ticks);
        self.cpu.poll_peripherals()?;
        self.cpu.run()?;
        Ok(())
    }

    pub fn is_waiting_for_interrupt(&self) -> bool {
        self.cpu.is_waiting_for_interrupt()
    }
}
