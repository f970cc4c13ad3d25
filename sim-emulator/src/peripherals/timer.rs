//! A single-channel alarm timer: firmware writes a relative delay, arms it
//! with `SVC_ARM`, and the timer raises its own pid's interrupt once virtual
//! time reaches that deadline. Grounded in `peripherals.py`'s `Timer`; UUID
//! carried over verbatim.

use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::registry::{Peripheral, PeripheralHost};

const SVC_ARM: u16 = 0;
const SVC_DISARM: u16 = 1;

pub struct Timer {
    now: u64,
    pending_delay: u64,
    deadline: Option<u64>,
    pid: u8,
}

impl Timer {
    pub const UUID: Uuid = uuid!("20c98436-994e-11ea-8de8-23fb8fc027a4");

    pub fn new(pid: u8) -> Self {
        Timer { now: 0, pending_delay: 0, deadline: None, pid }
    }
}

impl Peripheral for Timer {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.now.to_le_bytes());
        out[8..16].copy_from_slice(&self.deadline.unwrap_or(u64::MAX).to_le_bytes());
    }

    fn write_page(&mut self, data: &[u8]) {
        self.pending_delay = u64::from_le_bytes(data[16..24].try_into().unwrap());
    }

    fn svc(&mut self, host: &mut dyn PeripheralHost, fid: u16) -> Result<()> {
        match fid {
            SVC_ARM => {
                self.deadline = Some(host.ticks() + self.pending_delay);
                Ok(())
            }
            SVC_DISARM => {
                self.deadline = None;
                host.clear_irq(self.pid);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn poll(&mut self, host: &mut dyn PeripheralHost) {
        self.now = host.ticks();
        if let Some(deadline) = self.deadline {
            if self.now >= deadline {
                self.deadline = None;
                host.raise_irq(self.pid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeHost {
        ticks: u64,
        raised: Vec<u8>,
    }

    impl PeripheralHost for FakeHost {
        fn log(&mut self, _message: &str) {}
        fn wake(&mut self) {}
        fn ticks(&self) -> u64 {
            self.ticks
        }
        fn raise_irq(&mut self, pid: u8) {
            self.raised.push(pid);
        }
        fn clear_irq(&mut self, _pid: u8) {}
    }

    #[test]
    fn fires_once_deadline_is_reached() {
        let mut timer = Timer::new(3);
        let mut host = FakeHost { ticks: 0, raised: Vec::new() };
        timer.pending_delay = 100;
        timer.svc(&mut host, SVC_ARM).unwrap();

        host.ticks = 50;
        timer.poll(&mut host);
        assert!(host.raised.is_empty());

        host.ticks = 100;
        timer.poll(&mut host);
        assert_eq!(host.raised, vec![3]);

        host.ticks = 200;
        timer.poll(&mut host);
        assert_eq!(host.raised, vec![3], "must not re-fire after disarming");
    }

    #[test]
    fn disarm_clears_a_pending_deadline() {
        let mut timer = Timer::new(0);
        let mut host = FakeHost { ticks: 0, raised: Vec::new() };
        timer.pending_delay = 10;
        timer.svc(&mut host, SVC_ARM).unwrap();
        timer.svc(&mut host, SVC_DISARM).unwrap();

        host.ticks = 100;
        timer.poll(&mut host);
        assert!(host.raised.is_empty());
    }
}
