//! The host-side "universal gateway": a [`sim_medium::LoraMsgProcessor`]
//! listener that buffers completed uplinks (skipping its own downlinks and
//! any IQ-inverted traffic) as a FIFO of [`LoraWanMsg`], and a
//! [`sim_medium::Transmitter`] for scheduling downlinks back out. Grounded
//! in `lorawan.py`'s `UniversalGateway`: `msg_complete`, `next_up`,
//! `sched_dn`, `getupch`, `unpack`.

use std::sync::{Arc, Mutex};

use sim_medium::{LoraMsg, LoraMsgProcessor, Medium, Transmitter};
use sim_region::Region;
use sim_runtime::Scheduler;
use tokio::sync::mpsc;

use crate::error::LnsError;

/// A completed uplink, annotated with the `(region, channel-frequency,
/// data-rate)` triple it matched. `ch` is the uplink frequency itself
/// (the simulator's simplified region tables don't enumerate channels by
/// index), matching §3's `LoraWanMsg` invariant in spirit.
#[derive(Debug, Clone)]
pub struct LoraWanMsg {
    pub msg: LoraMsg,
    pub region: sim_region::RegionKind,
    pub ch: u32,
    pub dr: u8,
}

struct GatewayListener {
    sender: mpsc::UnboundedSender<LoraMsg>,
    self_tag: u64,
}

impl LoraMsgProcessor for GatewayListener {
    fn msg_preamble(&mut self, _msg: &LoraMsg) {}
    fn msg_payload(&mut self, _msg: &LoraMsg) {}

    fn msg_complete(&mut self, msg: &LoraMsg) {
        if msg.rps.is_iq_inv() || msg.src == self.self_tag {
            return;
        }
        let _ = self.sender.send(msg.clone());
    }

    fn msg_abort(&mut self, _msg: &LoraMsg) {}
}

/// A Medium listener that decodes uplink channel/DR, queues frames for
/// consumers, and schedules downlinks through its own [`Transmitter`].
pub struct UniversalGateway {
    regions: Vec<sim_region::RegionKind>,
    xmtr: Transmitter,
    upframes: mpsc::UnboundedReceiver<LoraMsg>,
    self_tag: u64,
}

impl UniversalGateway {
    /// `self_tag` is this gateway's own `LoraMsg::src` value so it can
    /// recognize (and not re-surface) the downlinks it schedules itself.
    pub fn new(
        scheduler: Arc<Mutex<Scheduler>>,
        medium: Arc<Mutex<dyn Medium + Send>>,
        regions: Vec<sim_region::RegionKind>,
        self_tag: u64,
    ) -> Self {
        let (sender, upframes) = mpsc::unbounded_channel();
        medium.lock().unwrap().register(Box::new(GatewayListener { sender, self_tag }));
        UniversalGateway { regions, xmtr: Transmitter::new(scheduler, medium), upframes, self_tag }
    }

    /// Await the next queued uplink, annotating `rssi`/`snr` if unset and
    /// resolving its `(region, channel, dr)` triple. Returns `None` once the
    /// gateway's sending half has been dropped (simulation torn down).
    pub async fn next_up(&mut self) -> Option<Result<LoraWanMsg, LnsError>> {
        let msg = self.upframes.recv().await?;
        Some(self.classify(msg))
    }

    /// Resolve `msg`'s `(region, channel, dr)` by matching its frequency and
    /// decoded `(sf, bw)` against each configured region's tables, in
    /// registration order — the first region whose channel plan and DR table
    /// both accept the message wins. Mirrors `getupch`.
    pub fn classify(&self, mut msg: LoraMsg) -> Result<LoraWanMsg, LnsError> {
        msg.annotate_rssi_snr();
        let (sf, bw) = msg.rps.get_sf_bw();
        for &kind in &self.regions {
            let region = kind.region();
            if !region.is_uplink_channel(msg.freq) {
                continue;
            }
            if let Ok(dr) = region.dr_for_sf_bw(sf, bw) {
                return Ok(LoraWanMsg { ch: msg.freq, dr, region: kind, msg });
            }
        }
        Err(LnsError::UnknownChannel)
    }

    /// Hand a downlink to this gateway's transmitter, tagging it as our own
    /// so [`GatewayListener::msg_complete`] won't loop it back as an uplink.
    pub fn sched_dn(&mut self, mut msg: LoraMsg) {
        msg.src = self.self_tag;
        self.xmtr.transmit(msg);
    }
}
