//! Nested vectored interrupt controller. Tracks which peripheral ids have a
//! pending interrupt, their enable mask, and a priority-ordered stack of
//! currently-active handlers. Grounded in `peripherals.py`'s `NVIC`, which
//! doubles as `device.py`'s `IrqHandler`.
//!
//! Its state lives behind an `Rc<RefCell<_>>` shared between the boxed
//! [`Peripheral`] (reachable via the pid table, for register page I/O) and
//! the [`IrqController`] handle `Simulation` keeps outside that table for
//! the hot interrupt-delivery path.

use std::cell::RefCell;
use std::rc::Rc;

use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::registry::{IrqController, Peripheral, PeripheralHost};

const MAX_PIDS: usize = 32;

struct NvicCore {
    pending: u32,
    enabled: u32,
    vectors: [u32; MAX_PIDS],
    active: Vec<u8>,
}

impl NvicCore {
    fn new() -> Self {
        NvicCore { pending: 0, enabled: 0, vectors: [0; MAX_PIDS], active: Vec::new() }
    }
}

impl IrqController for NvicCore {
    fn requested(&self) -> bool {
        (self.pending & self.enabled) != 0
    }

    fn handler(&mut self) -> Option<u32> {
        let floor = self.active.last().copied().unwrap_or(MAX_PIDS as u8);
        let candidates = self.pending & self.enabled;
        for pid in 0..floor {
            if candidates & (1 << pid) != 0 {
                self.pending &= !(1 << pid);
                self.active.push(pid);
                return Some(self.vectors[pid as usize]);
            }
        }
        None
    }

    fn done(&mut self) {
        self.active.pop();
    }

    fn set(&mut self, pid: u8) {
        self.pending |= 1 << pid;
    }

    fn clear(&mut self, pid: u8) {
        self.pending &= !(1 << pid);
    }
}

pub struct Nvic(Rc<RefCell<NvicCore>>);

impl Nvic {
    pub const UUID: Uuid = uuid!("439a2c60-ac1b-11ea-99f0-d1119d1d4e55");

    pub fn new() -> Self {
        Nvic(Rc::new(RefCell::new(NvicCore::new())))
    }
}

impl Default for Nvic {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for Nvic {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, out: &mut [u8]) {
        let core = self.0.borrow();
        out[0..4].copy_from_slice(&core.pending.to_le_bytes());
        out[4..8].copy_from_slice(&core.enabled.to_le_bytes());
        for (pid, vector) in core.vectors.iter().enumerate() {
            let off = 8 + pid * 4;
            out[off..off + 4].copy_from_slice(&vector.to_le_bytes());
        }
    }

    fn write_page(&mut self, data: &[u8]) {
        let mut core = self.0.borrow_mut();
        core.enabled = u32::from_le_bytes(data[4..8].try_into().unwrap());
        for pid in 0..MAX_PIDS {
            let off = 8 + pid * 4;
            core.vectors[pid] = u32::from_le_bytes(data[off..off + 4].try_into().unwrap());
        }
    }

    fn svc(&mut self, _host: &mut dyn PeripheralHost, _fid: u16) -> Result<()> {
        Ok(())
    }

    fn as_irq_controller(&self) -> Option<Rc<RefCell<dyn IrqController>>> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_pid_wins_priority() {
        let mut core = NvicCore::new();
        core.enabled = 0b11;
        core.vectors[0] = 0x1000;
        core.vectors[1] = 0x2000;
        core.set(1);
        core.set(0);
        assert_eq!(core.handler(), Some(0x1000));
    }

    #[test]
    fn nested_irq_only_preempts_a_higher_priority_one() {
        let mut core = NvicCore::new();
        core.enabled = 0b11;
        core.vectors[0] = 0x1000;
        core.vectors[1] = 0x2000;
        core.set(1);
        assert_eq!(core.handler(), Some(0x2000));
        core.set(0);
        // pid 0 has higher priority than the active pid 1, so it preempts.
        assert_eq!(core.handler(), Some(0x1000));
        core.done();
        assert!(!core.requested());
    }

    #[test]
    fn disabled_pid_never_fires() {
        let mut core = NvicCore::new();
        core.enabled = 0b10;
        core.set(0);
        assert!(!core.requested());
        assert_eq!(core.handler(), None);
    }
}
