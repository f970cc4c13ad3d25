//! The six built-in peripheral models, carried over UUID-for-UUID from
//! `unicorn/simul/peripherals.py`'s `@Peripherals.add` classes.

pub mod debug;
pub mod fast_uart;
pub mod gpio;
pub mod nvic;
pub mod radio;
pub mod timer;

use crate::registry::PeripheralCatalog;

pub use debug::DebugUnit;
pub use fast_uart::FastUart;
pub use gpio::Gpio;
pub use nvic::Nvic;
pub use radio::Radio;
pub use timer::Timer;

/// Register the peripherals that need no wiring beyond their `pid` into a
/// catalog. The radio is deliberately excluded — it needs a medium and
/// scheduler handle from the `sim` crate and is installed directly with
/// [`crate::Simulation::install_peripheral`].
pub fn register_all(catalog: &mut PeripheralCatalog) {
    catalog.register(DebugUnit::UUID, |_pid| Box::new(DebugUnit::new()));
    catalog.register(Nvic::UUID, |_pid| Box::new(Nvic::new()));
    catalog.register(Timer::UUID, |pid| Box::new(Timer::new(pid)));
    catalog.register(Gpio::UUID, |_pid| Box::new(Gpio::new()));
    catalog.register(FastUart::UUID, |pid| Box::new(FastUart::new(pid)));
}
