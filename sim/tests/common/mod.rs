//! Shared scaffolding for the end-to-end scenario tests: hand-rolled
//! PHYPayload builders standing in for firmware (the device side of the
//! protocol, which this workspace never compiles to ARM machine code), plus
//! a one-line join helper used by every scenario.

use lora_modulation::{Bandwidth, CodingRate, SpreadingFactor};
use lorawan_codec::{FCtrlUplink, Mhdr, MType};
use lorawan_encoding::default_crypto::DefaultFactory;
use lorawan_encoding::keys::{CryptoFactory, AES128};
use sim_gateway::{JoinAccept, JoinParams, Lns};
use sim_medium::{LoraMsg, Rps};
use sim_region::RegionKind;

pub const EU868_UPLINK_FREQ: u32 = 868_100_000;

pub fn nwkkey(bytes: &[u8; 16]) -> AES128 {
    AES128(*bytes)
}

/// Build a Join-Request PHYPayload and wrap it in a [`LoraMsg`] arriving on
/// the EU868 join channel at tick `0`.
pub fn jreq_msg(key: &AES128, dev_eui: [u8; 8], dev_nonce: u16) -> LoraMsg {
    let mut raw: heapless::Vec<u8, 23> = heapless::Vec::new();
    let _ = raw.push(0x00); // MHDR: JoinRequest
    let _ = raw.extend_from_slice(&[0u8; 8]); // JoinEUI
    let _ = raw.extend_from_slice(&dev_eui);
    let _ = raw.extend_from_slice(&dev_nonce.to_le_bytes());

    let factory = DefaultFactory;
    let mac = factory.new_mac(key);
    let mic = lorawan_encoding::securityhelpers::calculate_mic(&raw[1..19], mac);
    let _ = raw.extend_from_slice(&mic.0);

    let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
    LoraMsg::new(1, EU868_UPLINK_FREQ, rps, &raw, 0)
}

pub fn default_join_params(key: AES128) -> JoinParams {
    JoinParams {
        nwkkey: key,
        app_nonce: [1, 2, 3],
        net_id: [4, 5, 6],
        rx_delay: 1,
        rx1_dr_offset: 0,
        rx2_dr: 0,
        cflist: None,
        rx2: false,
    }
}

/// Join a fresh device and return its accept plus the session keys, for
/// tests that need to build further uplinks/downlinks by hand.
pub fn join(lns: &mut Lns, key: &AES128, dev_eui: [u8; 8], dev_nonce: u16) -> JoinAccept {
    let msg = jreq_msg(key, dev_eui, dev_nonce);
    lns.join(&msg, RegionKind::Eu868, &default_join_params(*key)).expect("join should succeed")
}

/// Build an uplink data-frame PHYPayload: the device side of
/// `lorawan_codec::pack_dataframe`/`unpack_dataframe`, which this workspace
/// only implements for downlinks (the LNS's half of the wire protocol).
#[allow(clippy::too_many_arguments)]
pub fn pack_uplink(
    confirmed: bool,
    dev_addr: [u8; 4],
    fcnt: u16,
    fcnt_full: u32,
    fport: Option<u8>,
    frm_payload: &[u8],
    nwk_skey: &AES128,
    app_skey: &AES128,
) -> heapless::Vec<u8, 256> {
    let mtype = if confirmed { MType::ConfirmedDataUp } else { MType::UnconfirmedDataUp };
    let mhdr = Mhdr::new().with_mtype(mtype).with_rfu(0).with_major(0);

    let mut body: heapless::Vec<u8, 256> = heapless::Vec::new();
    let _ = body.push(mhdr.into_bytes()[0]);
    let mut addr_le = dev_addr;
    addr_le.reverse();
    let _ = body.extend_from_slice(&addr_le);

    let fctrl = FCtrlUplink::new().with_adr(false).with_adr_ack_req(false).with_ack(false).with_fopts_len(0);
    let _ = body.push(fctrl.into_bytes()[0]);
    let _ = body.extend_from_slice(&fcnt.to_le_bytes());

    let factory = DefaultFactory;
    if let Some(fport) = fport {
        let _ = body.push(fport);
        if !frm_payload.is_empty() {
            let key = if fport == 0 { nwk_skey } else { app_skey };
            let enc = factory.new_enc(key);
            let start = body.len();
            let _ = body.extend_from_slice(frm_payload);
            let end = body.len();
            let cipher = lorawan_encoding::securityhelpers::encrypt_frm_data_payload(&body, start, end, fcnt_full, &enc);
            body.truncate(start);
            let _ = body.extend_from_slice(&cipher);
        }
    }

    let mac = factory.new_mac(nwk_skey);
    let mic = lorawan_encoding::securityhelpers::calculate_data_mic(&body, mac, fcnt_full);
    let _ = body.extend_from_slice(&mic.0);
    body
}

pub fn uplink_msg(src: u64, arrival_tick: u64, pdu: &[u8]) -> LoraMsg {
    let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
    LoraMsg::new(src, EU868_UPLINK_FREQ, rps, pdu, arrival_tick)
}
