//! Top-level facade wiring the scheduler, medium, emulator and LoRaWAN
//! network server together into one [`Network`], plus the [`Device`] wrapper
//! around one emulated end device. Ports `device.py`'s top-level `Simulation`
//! object, which owns exactly these same pieces.

pub mod device;
pub mod error;

pub use device::Device;
pub use error::SimError;

use std::sync::{Arc, Mutex};

use sim_gateway::{Lns, UniversalGateway};
use sim_medium::{Medium, SimpleMedium};
use sim_region::RegionKind;
use sim_runtime::clock::VirtualClock;
use sim_runtime::Scheduler;

/// This gateway's own `LoraMsg::src` tag, distinguishing its downlinks from
/// device uplinks on the shared medium.
pub const GATEWAY_TAG: u64 = 0;

/// The shared infrastructure every simulated device and the test harness
/// talk through: one [`Scheduler`]/[`Medium`] pair, one [`UniversalGateway`],
/// and one [`Lns`].
pub struct Network {
    pub scheduler: Arc<Mutex<Scheduler>>,
    pub medium: Arc<Mutex<dyn Medium + Send>>,
    pub gateway: UniversalGateway,
    pub lns: Lns,
}

impl Network {
    /// Build a network over a fresh [`VirtualClock`] (deterministic, never
    /// advances on its own) and a [`SimpleMedium`], serving the given
    /// regions.
    pub fn new_virtual(regions: Vec<RegionKind>) -> Self {
        let scheduler = Arc::new(Mutex::new(Scheduler::new(Box::new(VirtualClock::new()))));
        let medium: Arc<Mutex<dyn Medium + Send>> = Arc::new(Mutex::new(SimpleMedium::new()));
        let gateway = UniversalGateway::new(scheduler.clone(), medium.clone(), regions, GATEWAY_TAG);
        Network { scheduler, medium, gateway, lns: Lns::new() }
    }

    /// Advance the virtual clock straight to `ticks` and drain every job due
    /// by then. Only meaningful when the scheduler was built with a
    /// [`VirtualClock`] (panics otherwise, mirroring `Scheduler::clock`'s own
    /// downcast contract).
    pub fn advance_to(&self, ticks: sim_runtime::Tick) {
        let sched = self.scheduler.lock().unwrap();
        sched.clock().as_any_virtual().expect("advance_to requires a VirtualClock").advance_to(ticks);
        drop(sched);
        self.scheduler.lock().unwrap().step();
    }

    pub fn new_device(&self) -> Result<Device, SimError> {
        Device::new(self.scheduler.clone(), self.medium.clone())
    }
}
