//! A UART modeled as instantaneous byte transfer (no baud-rate timing) with
//! a TX-complete interrupt, matching the "fast" framing `peripherals.py`'s
//! `FastUART` uses to keep simulated boot logs from dominating wall-clock
//! runtime. UUID carried over verbatim.

use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::registry::{Peripheral, PeripheralHost};

const SVC_SEND: u16 = 0;

pub struct FastUart {
    tx_byte: u8,
    rx_buf: heapless::Deque<u8, 256>,
    pid: u8,
}

impl FastUart {
    pub const UUID: Uuid = uuid!("a806819e-0134-11eb-a845-f739a072dd5c");

    pub fn new(pid: u8) -> Self {
        FastUart { tx_byte: 0, rx_buf: heapless::Deque::new(), pid }
    }

    /// Feed a byte in from "the wire", for test harnesses driving the guest
    /// over this UART.
    pub fn push_rx(&mut self, byte: u8) {
        let _ = self.rx_buf.push_back(byte);
    }
}

impl Peripheral for FastUart {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, out: &mut [u8]) {
        out[0] = self.tx_byte;
        out[1] = self.rx_buf.front().copied().unwrap_or(0);
        out[2] = if self.rx_buf.is_empty() { 0 } else { 1 };
    }

    fn write_page(&mut self, data: &[u8]) {
        self.tx_byte = data[0];
    }

    fn svc(&mut self, host: &mut dyn PeripheralHost, fid: u16) -> Result<()> {
        match fid {
            SVC_SEND => {
                host.log(&format!("uart tx: {:#04x}", self.tx_byte));
                host.raise_irq(self.pid);
                Ok(())
            }
            _ => {
                self.rx_buf.pop_front();
                Ok(())
            }
        }
    }
}
