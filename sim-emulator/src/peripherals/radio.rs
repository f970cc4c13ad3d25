//! The LoRa radio: couples the peripheral SVC ABI to a
//! [`sim_medium::Transmitter`]/[`sim_medium::Receiver`] pair on a shared
//! [`sim_medium::Medium`]. Grounded in `peripherals.py`'s `Radio`; UUID
//! carried over verbatim. Unlike the other built-ins this peripheral can't
//! be produced by the generic `Fn(u8) -> Box<dyn Peripheral>` catalog
//! factory — it needs a medium and scheduler handle from the owning `sim`
//! crate — so it's installed directly via
//! [`crate::Simulation::install_peripheral`].

use std::sync::{Arc, Mutex};

use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};
use sim_medium::{LoraMsg, Medium, Receiver, Rps, Transmitter};
use sim_runtime::Scheduler;
use uuid::{uuid, Uuid};

use crate::error::Result;
use crate::registry::{Peripheral, PeripheralHost};

const SVC_RESET: u16 = 0;
const SVC_TX: u16 = 1;
const SVC_RX: u16 = 2;
const SVC_CLEAR_IRQ: u16 = 3;

const OFF_FREQ: usize = 0;
const OFF_RPS: usize = 4;
const OFF_XPOW: usize = 8;
const OFF_TX_LEN: usize = 12;
const OFF_RX_MINSYMS: usize = 16;
const OFF_RX_LEN: usize = 24;
const OFF_RX_RSSI: usize = 28;
const OFF_RX_SNR: usize = 32;
const OFF_TX_BUF: usize = 36;
const OFF_RX_BUF: usize = 36 + 256;

type RxSlot = Arc<Mutex<Option<Option<LoraMsg>>>>;

pub struct Radio {
    pid: u8,
    xmtr: Transmitter,
    rcvr: Receiver,
    freq: u32,
    rps: Rps,
    xpow: f32,
    tx_len: u8,
    tx_buf: [u8; 256],
    /// Minimum preamble symbols to wait for before a receive window times
    /// out, passed as `minsyms` to [`Receiver::receive`].
    rx_minsyms: u8,
    rx_result: RxSlot,
    rx_len: u8,
    rx_buf: [u8; 256],
    rx_rssi: f32,
    rx_snr: f32,
    tx_deadline: Option<u64>,
}

impl Radio {
    pub const UUID: Uuid = uuid!("3888937c-ab4c-11ea-aeed-27009b59e638");

    pub fn new(pid: u8, scheduler: Arc<Mutex<Scheduler>>, medium: Arc<Mutex<dyn Medium + Send>>) -> Self {
        let xmtr = Transmitter::new(scheduler.clone(), medium.clone());
        let rcvr = Receiver::new(scheduler);
        medium.lock().unwrap().register(rcvr.listener());
        Radio {
            pid,
            xmtr,
            rcvr,
            freq: 0,
            rps: Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false),
            xpow: 0.0,
            tx_len: 0,
            tx_buf: [0; 256],
            rx_minsyms: sim_medium::PREAMBLE_SYMBOLS,
            rx_result: Arc::new(Mutex::new(None)),
            rx_len: 0,
            rx_buf: [0; 256],
            rx_rssi: 0.0,
            rx_snr: 0.0,
            tx_deadline: None,
        }
    }
}

impl Peripheral for Radio {
    fn uuid(&self) -> Uuid {
        Self::UUID
    }

    fn read_page(&self, out: &mut [u8]) {
        out[OFF_RX_LEN] = self.rx_len;
        out[OFF_RX_RSSI..OFF_RX_RSSI + 4].copy_from_slice(&self.rx_rssi.to_le_bytes());
        out[OFF_RX_SNR..OFF_RX_SNR + 4].copy_from_slice(&self.rx_snr.to_le_bytes());
        out[OFF_RX_BUF..OFF_RX_BUF + 256].copy_from_slice(&self.rx_buf);
    }

    fn write_page(&mut self, data: &[u8]) {
        self.freq = u32::from_le_bytes(data[OFF_FREQ..OFF_FREQ + 4].try_into().unwrap());
        let raw_rps = u32::from_le_bytes(data[OFF_RPS..OFF_RPS + 4].try_into().unwrap());
        self.rps = Rps::from_raw(raw_rps);
        self.xpow = f32::from_le_bytes(data[OFF_XPOW..OFF_XPOW + 4].try_into().unwrap());
        self.tx_len = data[OFF_TX_LEN];
        let minsyms = u64::from_le_bytes(data[OFF_RX_MINSYMS..OFF_RX_MINSYMS + 8].try_into().unwrap());
        self.rx_minsyms = minsyms.min(u8::MAX as u64) as u8;
        self.tx_buf.copy_from_slice(&data[OFF_TX_BUF..OFF_TX_BUF + 256]);
    }

    fn svc(&mut self, host: &mut dyn PeripheralHost, fid: u16) -> Result<()> {
        match fid {
            SVC_RESET => {
                self.xmtr.abort();
                self.rcvr.cancel();
                self.tx_deadline = None;
                host.clear_irq(self.pid);
                Ok(())
            }
            SVC_TX => {
                let payload = &self.tx_buf[..self.tx_len as usize];
                let msg = LoraMsg::new(self.pid as u64, self.freq, self.rps, payload, host.ticks()).with_xpow(self.xpow);
                self.tx_deadline = Some(msg.xend);
                self.xmtr.transmit(msg);
                Ok(())
            }
            SVC_RX => {
                *self.rx_result.lock().unwrap() = None;
                let slot = self.rx_result.clone();
                self.rcvr.receive(host.ticks(), self.freq, self.rps, self.rx_minsyms, move |result| {
                    *slot.lock().unwrap() = Some(result);
                })?;
                Ok(())
            }
            SVC_CLEAR_IRQ => {
                host.clear_irq(self.pid);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn poll(&mut self, host: &mut dyn PeripheralHost) {
        if let Some(deadline) = self.tx_deadline {
            if host.ticks() >= deadline {
                self.tx_deadline = None;
                self.xmtr.notify_complete();
                host.raise_irq(self.pid);
            }
        }
        let result = self.rx_result.lock().unwrap().take();
        if let Some(result) = result {
            match result {
                Some(msg) => {
                    let len = msg.payload.len().min(self.rx_buf.len());
                    self.rx_buf[..len].copy_from_slice(&msg.payload[..len]);
                    self.rx_len = len as u8;
                    self.rx_rssi = msg.rssi.unwrap_or(0.0);
                    self.rx_snr = msg.snr.unwrap_or(0.0);
                }
                None => {
                    self.rx_len = 0;
                    self.rx_rssi = 0.0;
                    self.rx_snr = 0.0;
                }
            }
            host.raise_irq(self.pid);
        }
    }
}
