//! Errors surfaced by the emulator core. All are fatal per §7: the driver
//! loop halts and re-raises the error rather than continuing to step.

use uuid::Uuid;

/// The three PANIC sub-types the guest's `SVC_PANIC` can report, carried
/// verbatim from `device.py`'s `svc_panic` formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicType {
    Exception,
    BootLoader,
    Firmware,
}

impl PanicType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => PanicType::Exception,
            1 => PanicType::BootLoader,
            _ => PanicType::Firmware,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("guest PANIC: type={ptype:?} reason={reason} (0x{reason:x}) addr=0x{addr:08x} lr=0x{lr:08x}")]
    Panic { ptype: PanicType, reason: u32, addr: u32, lr: u32 },

    #[error("unknown SVCID {svcid} at lr=0x{lr:08x}")]
    UnknownSvc { svcid: u32, lr: u32 },

    #[error("unknown peripheral id {pid} at lr=0x{lr:08x}")]
    UnknownPeripheralId { pid: u8, lr: u32 },

    #[error("unregistered peripheral type {0}")]
    UnregisteredPeripheral(Uuid),

    #[error("peripheral slot {0} already occupied")]
    PeripheralSlotTaken(u8),

    #[error("GPIO short circuit: outm & inpm = 0b{0:b}")]
    GpioShortCircuit(u32),

    #[error("unicorn engine error: {0:?}")]
    Unicorn(unicorn_engine::unicorn_const::uc_error),

    #[error("unexpected special-return address 0x{0:08x}")]
    UnexpectedSpecialReturn(u32),

    #[error("radio medium error: {0}")]
    Medium(#[from] sim_medium::MediumError),
}

impl From<unicorn_engine::unicorn_const::uc_error> for EmulatorError {
    fn from(e: unicorn_engine::unicorn_const::uc_error) -> Self {
        EmulatorError::Unicorn(e)
    }
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
