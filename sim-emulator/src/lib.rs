//! ARM/Thumb CPU emulation, the peripheral SVC ABI, and the six built-in
//! peripheral models. Grounded in `unicorn/simul/device.py` and
//! `unicorn/simul/peripherals.py` from the original firmware simulator,
//! reimplemented on top of the `unicorn-engine` crate (the same Unicorn
//! Engine the Python original wraps through its own bindings).

pub mod error;
pub mod peripherals;
pub mod registry;
mod simulation;

pub use error::{EmulatorError, PanicType, Result};
pub use registry::{IrqController, Peripheral, PeripheralCatalog, PeripheralHost};
pub use simulation::{
    Simulation, EE_BASE, EE_SIZE, FLASH_BASE, FLASH_SIZE, IRQ_RETURN_ADDR, PERIPH_BASE, PERIPH_PAGE_SIZE,
    PERIPH_WINDOW_SIZE, RAM_BASE, RAM_SIZE, RESET_RETURN_ADDR, SPECIAL_RETURN_BASE, SPECIAL_RETURN_SIZE,
};
