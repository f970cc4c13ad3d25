//! The LoRaWAN Network Server: join handling, session bookkeeping, uplink
//! verification, and downlink framing. Grounded in `lorawan.py`'s `LNS`
//! class (`join`, `try_unpack`, `verify`, `up2dn_rx1`, `dn_rx2`), adapted so
//! the caller (not the LNS) owns scheduling — §4.J step 5 makes the caller
//! responsible for turning a `JoinAccept`'s relative delay into an absolute
//! tick and handing it to a [`crate::UniversalGateway`].

use crc::{Crc, CRC_32_ISO_HDLC};
use lora_modulation::CodingRate;
use lorawan_encoding::keys::AES128;
use sim_medium::{LoraMsg, Rps};
use sim_region::{Region, RegionKind};

use crate::error::LnsError;
use crate::session::{Session, SessionManager};

/// LoRaWAN 1.0.x `RECEIVE_DELAY1`/`RECEIVE_DELAY2` for Join-Accept specifically
/// (5s/6s, distinct from the shorter delay used for ordinary data downlinks).
pub const JOIN_ACCEPT_DELAY1_SECS: f64 = 5.0;
pub const JOIN_ACCEPT_DELAY2_SECS: f64 = 6.0;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn derive_devaddr(dev_eui: &[u8; 8]) -> [u8; 4] {
    CRC32.checksum(dev_eui).to_le_bytes()
}

/// A packed Join-Accept PHYPayload plus the radio parameters it must be sent
/// with; the delay from the triggering Join-Request's `xend` is a fixed
/// constant ([`JOIN_ACCEPT_DELAY1_SECS`]/[`JOIN_ACCEPT_DELAY2_SECS`]) the
/// caller applies when building the downlink's `LoraMsg`.
#[derive(Debug)]
pub struct JoinAccept {
    pub payload: heapless::Vec<u8, 33>,
    pub freq: u32,
    pub rps: Rps,
    pub xpow: f32,
    pub dev_eui: [u8; 8],
    pub dev_addr: [u8; 4],
}

/// Parameters for [`Lns::join`] that vary per test scenario; `nwkkey` plays
/// the role of both NwkKey and (for the 1.0.x profile this simulator
/// targets) AppKey.
pub struct JoinParams {
    pub nwkkey: AES128,
    pub app_nonce: [u8; 3],
    pub net_id: [u8; 3],
    pub rx_delay: u8,
    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    pub cflist: Option<[u8; 16]>,
    pub rx2: bool,
}

pub struct Lns {
    pub sessions: SessionManager,
}

impl Lns {
    pub fn new() -> Self {
        Lns { sessions: SessionManager::new() }
    }

    /// Verify a Join-Request (received on `jreq_msg`, already classified into
    /// `region`) and, if its DevNonce is strictly greater than the last one
    /// seen for this DevEUI, derive session keys, allocate a session, and
    /// build the Join-Accept bytes. On success, the session is already
    /// inserted into `self.sessions`.
    pub fn join(
        &mut self,
        jreq_msg: &LoraMsg,
        region: RegionKind,
        params: &JoinParams,
    ) -> Result<JoinAccept, LnsError> {
        let jreq = lorawan_codec::verify_jreq(&jreq_msg.payload, &params.nwkkey)?;

        if let Some(last) = self.sessions.last_dev_nonce(&jreq.dev_eui) {
            if jreq.dev_nonce <= last {
                return Err(LnsError::DevNonceNotIncreasing);
            }
        }

        let dev_nonce_bytes = jreq.dev_nonce.to_le_bytes();
        let nwk_skey = lorawan_codec::derive_key(
            lorawan_codec::DERIVE_NWK_SKEY,
            &params.app_nonce,
            &params.net_id,
            &dev_nonce_bytes,
            &params.nwkkey,
        );
        let app_skey = lorawan_codec::derive_key(
            lorawan_codec::DERIVE_APP_SKEY,
            &params.app_nonce,
            &params.net_id,
            &dev_nonce_bytes,
            &params.nwkkey,
        );

        let dev_addr = derive_devaddr(&jreq.dev_eui);
        let dl_settings = ((params.rx1_dr_offset & 0x7) << 4) | (params.rx2_dr & 0xf);

        let jacc_payload = lorawan_codec::pack_jacc(
            params.app_nonce,
            params.net_id,
            dev_addr,
            dl_settings,
            params.rx_delay,
            params.cflist.as_ref().map(|c| c.as_slice()),
            &params.nwkkey,
        );

        let reg = region.region();
        let (freq, sf, bw) = if params.rx2 {
            let (freq, dr) = reg.rx2();
            let d = reg.datarate(dr)?;
            (freq, d.spreading_factor, d.bandwidth)
        } else {
            let freq = reg.rx1_freq(jreq_msg.freq)?;
            let (up_sf, up_bw) = jreq_msg.rps.get_sf_bw();
            let up_dr = reg.dr_for_sf_bw(up_sf, up_bw)?;
            let dr = reg.rx1_dr(up_dr, params.rx1_dr_offset)?;
            let d = reg.datarate(dr)?;
            (freq, d.spreading_factor, d.bandwidth)
        };
        let rps = Rps::new(sf, bw, CodingRate::_4_5, true, false).with_iq_inv(true);

        let session = Session {
            dev_addr,
            dev_eui: jreq.dev_eui,
            join_eui: jreq.join_eui,
            nwk_skey,
            app_skey,
            last_dev_nonce: jreq.dev_nonce,
            fcnt_up: 0,
            fcnt_dn: 0,
            rx1_dr_offset: params.rx1_dr_offset,
            rx2_dr: params.rx2_dr,
            rx_delay_secs: params.rx_delay.max(1),
            region,
        };
        self.sessions.insert(session);

        Ok(JoinAccept { payload: jacc_payload, freq, rps, xpow: reg.max_eirp(), dev_eui: jreq.dev_eui, dev_addr })
    }

    /// Verify and decrypt an uplink data frame against whichever session
    /// matches `dev_addr` (there is normally exactly one), updating that
    /// session's `fcnt_up` to the frame's wire FCnt on success.
    pub fn verify_uplink(&mut self, pdu: &[u8], dev_addr: [u8; 4]) -> Result<lorawan_codec::DataFrame, LnsError> {
        let wire_fcnt = pdu.get(6..8).ok_or(LnsError::MalformedFrame)?;
        let wire_fcnt = u16::from_le_bytes([wire_fcnt[0], wire_fcnt[1]]);

        let session = self.sessions.by_addr(&dev_addr).ok_or(LnsError::NoSession)?;
        let frame = lorawan_codec::unpack_dataframe(pdu, wire_fcnt as u32, &session.nwk_skey, &session.app_skey)?;

        let session = self.sessions.by_addr_mut(&dev_addr).expect("checked above");
        session.fcnt_up = frame.fcnt as u32;
        Ok(frame)
    }

    /// Build a downlink data frame for `dev_addr`. `adj >= 0` schedules a
    /// fresh frame at `fcnt_dn + adj` and advances `fcnt_dn` by `1 + adj`;
    /// `adj < 0` rebuilds the *previous* frame byte-for-byte (a
    /// retransmission), leaving `fcnt_dn` untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn dl(
        &mut self,
        dev_addr: [u8; 4],
        confirmed: bool,
        ack: bool,
        fport: Option<u8>,
        frm_payload: &[u8],
        fopts: &[u8],
        adj: i32,
        invalid_mic: bool,
    ) -> Result<heapless::Vec<u8, 256>, LnsError> {
        let session = self.sessions.by_addr_mut(&dev_addr).ok_or(LnsError::NoSession)?;

        let fcnt_full: u32 =
            if adj >= 0 { session.fcnt_dn.wrapping_add(adj as u32) } else { session.fcnt_dn.wrapping_sub(1) };
        let fcnt = fcnt_full as u16;

        let mut bytes = lorawan_codec::pack_dataframe(
            confirmed,
            dev_addr,
            false,
            ack,
            false,
            fcnt,
            fcnt_full,
            fopts,
            fport,
            frm_payload,
            &session.nwk_skey,
            &session.app_skey,
        )?;

        if invalid_mic {
            let len = bytes.len();
            for b in bytes[len - 4..].iter_mut() {
                *b = !*b;
            }
        }

        if adj >= 0 {
            session.fcnt_dn = session.fcnt_dn.wrapping_add(1 + adj as u32);
        }

        Ok(bytes)
    }

    /// Remove a device's session outright (explicit teardown, or ahead of a
    /// re-Join that will insert a fresh one under possibly the same DevAddr).
    pub fn remove(&mut self, dev_addr: [u8; 4]) -> Option<Session> {
        self.sessions.remove(&dev_addr)
    }
}

impl Default for Lns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lora_modulation::{Bandwidth, SpreadingFactor};

    fn jreq_msg(nwkkey: &AES128, dev_eui: [u8; 8], dev_nonce: u16) -> LoraMsg {
        let raw = build_jreq(nwkkey, dev_eui, dev_nonce);
        let rps = Rps::new(SpreadingFactor::_7, Bandwidth::_125KHz, CodingRate::_4_5, true, false);
        LoraMsg::new(1, 868_100_000, rps, &raw, 0)
    }

    fn build_jreq(nwkkey: &AES128, dev_eui: [u8; 8], dev_nonce: u16) -> heapless::Vec<u8, 23> {
        use lorawan_encoding::default_crypto::DefaultFactory;
        use lorawan_encoding::keys::CryptoFactory;

        let mut raw: heapless::Vec<u8, 23> = heapless::Vec::new();
        let _ = raw.push(0x00); // MHDR: JoinRequest
        let _ = raw.extend_from_slice(&[0u8; 8]); // JoinEUI
        let _ = raw.extend_from_slice(&dev_eui);
        let _ = raw.extend_from_slice(&dev_nonce.to_le_bytes());

        let factory = DefaultFactory;
        let mac = factory.new_mac(nwkkey);
        let mic = lorawan_encoding::securityhelpers::calculate_mic(&raw[1..19], mac);
        let _ = raw.extend_from_slice(&mic.0);
        raw
    }

    fn default_params(nwkkey: AES128) -> JoinParams {
        JoinParams {
            nwkkey,
            app_nonce: [1, 2, 3],
            net_id: [4, 5, 6],
            rx_delay: 1,
            rx1_dr_offset: 0,
            rx2_dr: 0,
            cflist: None,
            rx2: false,
        }
    }

    #[test]
    fn join_creates_a_session_and_packs_an_accept() {
        let nwkkey = AES128(*b"@ABCDEFGHIJKLMNO");
        let mut lns = Lns::new();
        let msg = jreq_msg(&nwkkey, [1; 8], 7);
        let accept = lns.join(&msg, RegionKind::Eu868, &default_params(nwkkey)).unwrap();
        assert_eq!(accept.payload[0], 0x20); // MHDR: JoinAccept
        assert!(lns.sessions.by_eui(&[1; 8]).is_some());
    }

    #[test]
    fn devnonce_must_strictly_increase() {
        let nwkkey = AES128(*b"@ABCDEFGHIJKLMNO");
        let mut lns = Lns::new();
        let msg1 = jreq_msg(&nwkkey, [2; 8], 5);
        lns.join(&msg1, RegionKind::Eu868, &default_params(nwkkey)).unwrap();

        let msg2 = jreq_msg(&nwkkey, [2; 8], 4);
        let err = lns.join(&msg2, RegionKind::Eu868, &default_params(nwkkey)).unwrap_err();
        assert_eq!(err, LnsError::DevNonceNotIncreasing);
    }

    #[test]
    fn downlink_with_nonnegative_adj_advances_fcntdn_once() {
        let nwkkey = AES128(*b"@ABCDEFGHIJKLMNO");
        let mut lns = Lns::new();
        let msg = jreq_msg(&nwkkey, [3; 8], 1);
        let accept = lns.join(&msg, RegionKind::Eu868, &default_params(nwkkey)).unwrap();

        lns.dl(accept.dev_addr, false, false, Some(1), b"hi", &[], 0, false).unwrap();
        assert_eq!(lns.sessions.by_addr(&accept.dev_addr).unwrap().fcnt_dn, 1);

        lns.dl(accept.dev_addr, false, false, Some(1), b"hi", &[], 2, false).unwrap();
        assert_eq!(lns.sessions.by_addr(&accept.dev_addr).unwrap().fcnt_dn, 4);
    }

    #[test]
    fn retransmit_with_negative_adj_does_not_advance_fcntdn() {
        let nwkkey = AES128(*b"@ABCDEFGHIJKLMNO");
        let mut lns = Lns::new();
        let msg = jreq_msg(&nwkkey, [4; 8], 1);
        let accept = lns.join(&msg, RegionKind::Eu868, &default_params(nwkkey)).unwrap();

        let first = lns.dl(accept.dev_addr, false, false, Some(1), b"hi", &[], 0, false).unwrap();
        let retransmit = lns.dl(accept.dev_addr, false, false, Some(1), b"hi", &[], -1, false).unwrap();
        assert_eq!(first, retransmit);
        assert_eq!(lns.sessions.by_addr(&accept.dev_addr).unwrap().fcnt_dn, 1);
    }
}
