//! Line-buffered debug console, the simplest peripheral in the catalog.
//! Grounded in `peripherals.py`'s `DebugUnit` (UUID carried over verbatim).

use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::registry::{Peripheral, PeripheralHost};

const SVC_PUTC: u16 = 0;

pub struct DebugUnit {
    line: String,
    pending: u8,
}

impl DebugUnit {
    pub const UUID: Uuid = uuid!("4c25d84a-9913-11ea-8de8-23fb8fc027a4");

    pub fn new() -> Self {
        DebugUnit { line: String::new(), pending: 0 }
    }
}

impl Default for DebugUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl Peripheral for DebugUnit {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, _out: &mut [u8]) {}

    fn write_page(&mut self, data: &[u8]) {
        self.pending = data[0];
    }

    fn svc(&mut self, host: &mut dyn PeripheralHost, fid: u16) -> Result<()> {
        match fid {
            SVC_PUTC => {
                let c = self.pending as char;
                if c == '\n' {
                    host.log(&std::mem::take(&mut self.line));
                } else {
                    self.line.push(c);
                }
                Ok(())
            }
            _ => {
                host.log(&format!("debug: unknown fid {fid}"));
                Ok(())
            }
        }
    }
}
