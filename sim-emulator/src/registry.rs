//! Peripheral registry: a `UUID -> factory` catalog consulted by
//! `SVC_PERIPH_REG`, plus the per-[`crate::Simulation`] table from `pid` to
//! the live peripheral instance. Grounded in `device.py`'s `Peripherals`
//! class. The simulation is single-threaded and cooperative (one run loop,
//! driven from one task), so peripherals are `!Send` — the NVIC in
//! particular shares its pending/enabled state with `Simulation`'s active
//! `IrqController` handle through an `Rc<RefCell<_>>`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use uuid::Uuid;

use crate::error::{EmulatorError, Result};

/// The host services a [`Peripheral`] needs from its owning [`crate::Simulation`]
/// while handling an SVC: logging, waking the run loop, reading the current
/// tick, and poking the active interrupt controller. Kept narrow so a
/// peripheral never needs a full `&mut Simulation` (which would alias the
/// `peripherals` map it's being dispatched from).
pub trait PeripheralHost {
    fn log(&mut self, message: &str);
    fn wake(&mut self);
    fn ticks(&self) -> u64;
    fn raise_irq(&mut self, pid: u8);
    fn clear_irq(&mut self, pid: u8);
}

/// An interrupt controller: the single peripheral (normally the NVIC) wired
/// up as `Simulation`'s active `irqhandler`. Grounded in `device.py`'s
/// `IrqHandler` abstract class.
pub trait IrqController {
    fn requested(&self) -> bool;
    /// Pop the highest-priority pending pid above the current priority floor
    /// and push its priority onto the nesting stack, returning its vector
    /// address. `None` if nothing above the floor is pending.
    fn handler(&mut self) -> Option<u32>;
    /// Pop the priority nesting stack after an interrupt handler returns.
    fn done(&mut self);
    fn set(&mut self, pid: u8);
    fn clear(&mut self, pid: u8);
}

/// One peripheral instance, addressable by a 4096-byte register page mapped
/// into guest memory at `PERIPH_BASE + pid * 0x1000`.
pub trait Peripheral {
    fn uuid(&self) -> Uuid;

    /// Serialize current register state into the guest-visible page. Called
    /// once at registration and again whenever the peripheral's own logic
    /// (not firmware) changes a register the guest can read.
    fn read_page(&self, out: &mut [u8]);

    /// Absorb a page the guest may have written before this SVC/tick, so the
    /// peripheral's view of its own registers matches what firmware just set.
    fn write_page(&mut self, data: &[u8]);

    /// Handle `SVC fid` for this peripheral (the low 16 bits of a
    /// `>= SVC_PERIPH_BASE` svcid).
    fn svc(&mut self, host: &mut dyn PeripheralHost, fid: u16) -> Result<()>;

    /// Called by the driver loop whenever virtual time advances, independent
    /// of any SVC. Only peripherals with time-driven state (the timer, the
    /// radio) override this; everything else keeps the no-op default.
    fn poll(&mut self, _host: &mut dyn PeripheralHost) {}

    /// `Some` only for the peripheral meant to be wired up as the
    /// simulation's [`IrqController`] (the NVIC); every other peripheral
    /// keeps the default `None`.
    fn as_irq_controller(&self) -> Option<Rc<RefCell<dyn IrqController>>> {
        None
    }
}

type Factory = Box<dyn Fn(u8) -> Box<dyn Peripheral>>;

/// `UUID -> factory` catalog, built once via [`PeripheralCatalog::with_builtins`]
/// and consulted by `SVC_PERIPH_REG`.
#[derive(Default)]
pub struct PeripheralCatalog {
    factories: HashMap<Uuid, Factory>,
}

impl PeripheralCatalog {
    pub fn new() -> Self {
        PeripheralCatalog { factories: HashMap::new() }
    }

    pub fn register(&mut self, uuid: Uuid, factory: impl Fn(u8) -> Box<dyn Peripheral> + 'static) {
        self.factories.insert(uuid, Box::new(factory));
    }

    pub fn create(&self, uuid: Uuid, pid: u8) -> Result<Box<dyn Peripheral>> {
        let factory = self.factories.get(&uuid).ok_or(EmulatorError::UnregisteredPeripheral(uuid))?;
        Ok(factory(pid))
    }

    /// A catalog with every peripheral defined in `sim-emulator::peripherals`
    /// pre-registered, matching the set of `@Peripherals.add` classes in
    /// `peripherals.py`.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::peripherals::register_all(&mut catalog);
        catalog
    }
}
