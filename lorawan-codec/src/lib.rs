//! The narrow LoRaWAN join/dataframe codec used by the gateway and the
//! device simulator's Radio peripheral: MHDR/FHDR bit packing, MIC
//! computation/verification, FRMPayload encryption, and session-key
//! derivation. Everything beyond this surface (MAC command bodies, ADR,
//! multicast, certification) is out of scope — see the workspace's
//! `SPEC_FULL.md` Non-goals.

use lorawan_encoding::default_crypto::DefaultFactory;
use lorawan_encoding::keys::{CryptoFactory, Decrypter, Encrypter, AES128, MIC};
pub use lorawan_encoding::types::DLSettings;
use modular_bitfield::prelude::*;

mod error;
pub use error::Error;

/// LoRaWAN message type, the top 3 bits of MHDR.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 3]
pub enum MType {
    JoinRequest = 0b000,
    JoinAccept = 0b001,
    UnconfirmedDataUp = 0b010,
    UnconfirmedDataDown = 0b011,
    ConfirmedDataUp = 0b100,
    ConfirmedDataDown = 0b101,
    RejoinRequest = 0b110,
    Proprietary = 0b111,
}

#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy)]
pub struct Mhdr {
    pub major: B2,
    pub rfu: B3,
    pub mtype: MType,
}

#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy)]
pub struct FCtrlUplink {
    pub fopts_len: B4,
    pub class_b_or_fpending: bool,
    pub ack: bool,
    pub adr_ack_req: bool,
    pub adr: bool,
}

#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy)]
pub struct FCtrlDownlink {
    pub fopts_len: B4,
    pub fpending: bool,
    pub ack: bool,
    pub rfu: bool,
    pub adr: bool,
}

/// A decoded data-frame PHYPayload, stripped of its (already-verified) MIC.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub mtype: MType,
    pub dev_addr: [u8; 4],
    pub adr: bool,
    pub ack: bool,
    pub fpending_or_adrackreq: bool,
    pub fcnt: u16,
    pub fopts: heapless::Vec<u8, 15>,
    pub fport: Option<u8>,
    pub frm_payload: heapless::Vec<u8, 242>,
}

/// A decoded Join-Request.
#[derive(Debug, Clone, Copy)]
pub struct JoinRequest {
    pub join_eui: [u8; 8],
    pub dev_eui: [u8; 8],
    pub dev_nonce: u16,
}

/// Build a Join-Accept PHYPayload: `MHDR | AppNonce | NetID | DevAddr |
/// DLSettings | RxDelay | [CFList] | MIC`, with AppNonce/NetID/DevAddr/RxDelay/
/// CFList encrypted by the join/rejoin decrypt routine (an AES decrypt, per
/// the LoRaWAN spec's swapped encrypt/decrypt role for Join-Accept).
pub fn pack_jacc(
    app_nonce: [u8; 3],
    net_id: [u8; 3],
    dev_addr: [u8; 4],
    dl_settings: u8,
    rx_delay: u8,
    cflist: Option<&[u8]>,
    app_key: &AES128,
) -> heapless::Vec<u8, 33> {
    let mut plain: heapless::Vec<u8, 32> = heapless::Vec::new();
    let mhdr = Mhdr::new().with_mtype(MType::JoinAccept).with_rfu(0).with_major(0);
    let _ = plain.push(mhdr.into_bytes()[0]);
    let _ = plain.extend_from_slice(&app_nonce);
    let _ = plain.extend_from_slice(&net_id);
    let _ = plain.extend_from_slice(&dev_addr);
    let _ = plain.push(dl_settings);
    let _ = plain.push(rx_delay);
    if let Some(cflist) = cflist {
        let _ = plain.extend_from_slice(cflist);
    }

    let factory = DefaultFactory;
    let mac = factory.new_mac(app_key);
    let mic = lorawan_encoding::securityhelpers::calculate_mic(&plain[1..], mac);

    let mut with_mic: heapless::Vec<u8, 36> = heapless::Vec::new();
    let _ = with_mic.extend_from_slice(&plain);
    let _ = with_mic.extend_from_slice(&mic.0);

    // Join-Accept is AES-*decrypted* with AppKey so that an end device
    // (which only implements AES-encrypt in hardware) recovers it with a
    // single encrypt operation, per LoRaWAN 1.0.x section 6.2.3.
    let dec = factory.new_dec(app_key);
    let mut out: heapless::Vec<u8, 33> = heapless::Vec::new();
    let _ = out.push(with_mic[0]);
    let body = &with_mic[1..];
    for chunk in body.chunks(16) {
        let mut block = lorawan_encoding::securityhelpers::generic_array::GenericArray::default();
        block[..chunk.len()].copy_from_slice(chunk);
        dec.decrypt_block(&mut block);
        let _ = out.extend_from_slice(&block[..chunk.len()]);
    }
    out
}

/// Verify a Join-Request's MIC against `dev_key` (NwkKey for 1.1, AppKey for 1.0.x).
pub fn verify_jreq(raw: &[u8], dev_key: &AES128) -> Result<JoinRequest, Error> {
    if raw.len() != 23 {
        return Err(Error::MalformedFrame);
    }
    let factory = DefaultFactory;
    let mac = factory.new_mac(dev_key);
    let mic = lorawan_encoding::securityhelpers::calculate_mic(&raw[..19], mac);
    if mic.0 != raw[19..23] {
        return Err(Error::MicMismatch);
    }
    let mut join_eui = [0u8; 8];
    join_eui.copy_from_slice(&raw[1..9]);
    let mut dev_eui = [0u8; 8];
    dev_eui.copy_from_slice(&raw[9..17]);
    let dev_nonce = u16::from_le_bytes([raw[17], raw[18]]);
    Ok(JoinRequest { join_eui, dev_eui, dev_nonce })
}

/// Decode a data-frame PHYPayload's FHDR/FPort without verifying or decrypting
/// anything — used by the gateway to route a frame to the right session
/// before the session-specific keys are available.
pub fn unpack_nomic(raw: &[u8]) -> Result<DataFrame, Error> {
    if raw.len() < 12 {
        return Err(Error::MalformedFrame);
    }
    let mhdr = Mhdr::from_bytes([raw[0]]);
    let mtype = mhdr.mtype();
    let uplink = matches!(mtype, MType::UnconfirmedDataUp | MType::ConfirmedDataUp);

    let mut dev_addr = [0u8; 4];
    dev_addr.copy_from_slice(&raw[1..5]);
    dev_addr.reverse();

    let (adr, ack, fpending_or_adrackreq, fopts_len) = if uplink {
        let fctrl = FCtrlUplink::from_bytes([raw[5]]);
        (fctrl.adr(), fctrl.ack(), fctrl.adr_ack_req(), fctrl.fopts_len())
    } else {
        let fctrl = FCtrlDownlink::from_bytes([raw[5]]);
        (fctrl.adr(), fctrl.ack(), fctrl.fpending(), fctrl.fopts_len())
    };

    let fcnt = u16::from_le_bytes([raw[6], raw[7]]);
    let fopts_len = fopts_len as usize;
    let fhdr_end = 8 + fopts_len;
    if raw.len() < fhdr_end || raw.len() < fhdr_end + 4 {
        return Err(Error::MalformedFrame);
    }
    let mut fopts = heapless::Vec::new();
    let _ = fopts.extend_from_slice(&raw[8..fhdr_end]);

    let body = &raw[fhdr_end..raw.len() - 4];
    let (fport, frm_raw) = if body.is_empty() {
        (None, &body[0..0])
    } else {
        (Some(body[0]), &body[1..])
    };
    let mut frm_payload = heapless::Vec::new();
    let _ = frm_payload.extend_from_slice(frm_raw);

    Ok(DataFrame { mtype, dev_addr, adr, ack, fpending_or_adrackreq, fcnt, fopts, fport, frm_payload })
}

/// Decode and fully verify+decrypt a data-frame PHYPayload: checks the MIC
/// against `nwk_skey` (using the full 32-bit `fcnt_full` for the B0 block,
/// since the wire FCnt is truncated to 16 bits) and decrypts FRMPayload with
/// `app_skey` when `fport > 0`, or `nwk_skey` when `fport == 0` (MAC-only
/// payload).
pub fn unpack_dataframe(
    raw: &[u8],
    fcnt_full: u32,
    nwk_skey: &AES128,
    app_skey: &AES128,
) -> Result<DataFrame, Error> {
    if raw.len() < 12 {
        return Err(Error::MalformedFrame);
    }
    let body = &raw[..raw.len() - 4];
    let wire_mic = &raw[raw.len() - 4..];

    let factory = DefaultFactory;
    let mac = factory.new_mac(nwk_skey);
    let mic = lorawan_encoding::securityhelpers::calculate_data_mic(body, mac, fcnt_full);
    if mic.0 != wire_mic {
        return Err(Error::MicMismatch);
    }

    let mut frame = unpack_nomic(raw)?;
    if !frame.frm_payload.is_empty() {
        let key = if frame.fport == Some(0) { nwk_skey } else { app_skey };
        let enc = factory.new_enc(key);
        let frm_start = raw.len() - 4 - frame.frm_payload.len();
        let frm_end = raw.len() - 4;
        let plain = lorawan_encoding::securityhelpers::encrypt_frm_data_payload(
            raw, frm_start, frm_end, fcnt_full, &enc,
        );
        frame.frm_payload = heapless::Vec::new();
        let _ = frame.frm_payload.extend_from_slice(&plain);
    }
    Ok(frame)
}

/// Build a downlink data-frame PHYPayload (used by the LNS to encode a
/// scheduled downlink before handing it to the gateway/Medium).
#[allow(clippy::too_many_arguments)]
pub fn pack_dataframe(
    confirmed: bool,
    dev_addr: [u8; 4],
    adr: bool,
    ack: bool,
    fpending: bool,
    fcnt: u16,
    fcnt_full: u32,
    fopts: &[u8],
    fport: Option<u8>,
    frm_payload: &[u8],
    nwk_skey: &AES128,
    app_skey: &AES128,
) -> Result<heapless::Vec<u8, 256>, Error> {
    if fopts.len() > 15 {
        return Err(Error::MalformedFrame);
    }
    let mtype = if confirmed { MType::ConfirmedDataDown } else { MType::UnconfirmedDataDown };
    let mhdr = Mhdr::new().with_mtype(mtype).with_rfu(0).with_major(0);

    let mut body: heapless::Vec<u8, 256> = heapless::Vec::new();
    let _ = body.push(mhdr.into_bytes()[0]);
    let mut addr_le = dev_addr;
    addr_le.reverse();
    let _ = body.extend_from_slice(&addr_le);

    let fctrl = FCtrlDownlink::new()
        .with_adr(adr)
        .with_rfu(false)
        .with_ack(ack)
        .with_fpending(fpending)
        .with_fopts_len(fopts.len() as u8);
    let _ = body.push(fctrl.into_bytes()[0]);
    let _ = body.extend_from_slice(&fcnt.to_le_bytes());
    let _ = body.extend_from_slice(fopts);

    let factory = DefaultFactory;
    if let Some(fport) = fport {
        let _ = body.push(fport);
        if !frm_payload.is_empty() {
            let key = if fport == 0 { nwk_skey } else { app_skey };
            let enc = factory.new_enc(key);
            let start = body.len();
            let _ = body.extend_from_slice(frm_payload);
            let end = body.len();
            let cipher = lorawan_encoding::securityhelpers::encrypt_frm_data_payload(
                &body, start, end, fcnt_full, &enc,
            );
            body.truncate(start);
            let _ = body.extend_from_slice(&cipher);
        }
    }

    let mac = factory.new_mac(nwk_skey);
    let mic = lorawan_encoding::securityhelpers::calculate_data_mic(&body, mac, fcnt_full);
    let _ = body.extend_from_slice(&mic.0);
    Ok(body)
}

/// Session-key derivation type bytes (LoRaWAN 1.0.x section 6.2.5).
pub const DERIVE_NWK_SKEY: u8 = 0x01;
pub const DERIVE_APP_SKEY: u8 = 0x02;

/// Derive a session key: `type_byte` selects NwkSKey (`0x01`) or AppSKey (`0x02`).
pub fn derive_key(
    type_byte: u8,
    app_nonce: &[u8; 3],
    net_id: &[u8; 3],
    dev_nonce: &[u8; 2],
    app_key: &AES128,
) -> AES128 {
    let factory = DefaultFactory;
    let enc = factory.new_enc(app_key);
    lorawan_encoding::securityhelpers::derive_session_key(type_byte, app_nonce, net_id, dev_nonce, &enc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> AES128 {
        AES128([byte; 16])
    }

    #[test]
    fn jacc_roundtrips_through_decrypt() {
        let app_key = key(0x2b);
        let packed = pack_jacc([1, 2, 3], [4, 5, 6], [7, 8, 9, 10], 0x20, 1, None, &app_key);
        // An end device recovers Join-Accept with a single AES-ENCRYPT over the body.
        let factory = DefaultFactory;
        let enc = factory.new_enc(&app_key);
        let mut block = lorawan_encoding::securityhelpers::generic_array::GenericArray::default();
        block.copy_from_slice(&packed[1..17]);
        enc.encrypt_block(&mut block);
        assert_eq!(&block[0..3], &[1, 2, 3]); // AppNonce recovered
    }

    #[test]
    fn jreq_mic_mismatch_is_rejected() {
        let dev_key = key(0x11);
        let mut raw = [0u8; 23];
        raw[0] = Mhdr::new().with_mtype(MType::JoinRequest).into_bytes()[0];
        assert!(matches!(verify_jreq(&raw, &dev_key), Err(Error::MicMismatch)));
    }

    #[test]
    fn dataframe_roundtrips() {
        let nwk = key(0xaa);
        let app = key(0xbb);
        let packed = pack_dataframe(
            false, [1, 2, 3, 4], true, false, false, 5, 5, &[], Some(1), b"hello", &nwk, &app,
        )
        .unwrap();
        let frame = unpack_dataframe(&packed, 5, &nwk, &app).unwrap();
        assert_eq!(frame.frm_payload.as_slice(), b"hello");
        assert_eq!(frame.fport, Some(1));
    }

    #[test]
    fn unpack_nomic_rejects_short_buffers() {
        assert!(matches!(unpack_nomic(&[0u8; 4]), Err(Error::MalformedFrame)));
    }
}
