//! Production Test Equipment (PTE) protocol: the COBS/CRC32-framed command
//! channel used to personalize a device's EEPROM before first boot.
//! Grounded in `original_source/services/perso/perso.py`'s `PTE` class,
//! which frames `struct.pack('<BHB', cmd, tag, len) + payload`, pads with
//! `0xFF` to a 4-byte boundary, appends a CRC-32 (`binascii.crc32`, the same
//! IEEE/`CRC_32_ISO_HDLC` polynomial used elsewhere in this codebase), then
//! COBS-encodes the whole thing and terminates it with a `0x00` byte. The
//! first frame in a session is preceded by a `55 00 00 00` sync preamble.

use crc::{Crc, CRC_32_ISO_HDLC};
use sha2::{Digest, Sha256};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const SYNC_PREAMBLE: [u8; 4] = [0x55, 0x00, 0x00, 0x00];

pub const CMD_NOP: u8 = 0x00;
pub const CMD_RUN: u8 = 0x01;
pub const CMD_RESET: u8 = 0x02;
pub const CMD_EE_READ: u8 = 0x90;
pub const CMD_EE_WRITE: u8 = 0x91;

pub const RES_OK: u8 = 0x00;
/// `nop()` does not answer with `RES_OK` in the original tool; it expects
/// this literal byte instead.
pub const RES_NOP_ACK: u8 = 0x7F;
pub const RES_EPARAM: u8 = 0x80;
pub const RES_INTERR: u8 = 0x81;
pub const RES_WTX: u8 = 0xFE;
pub const RES_NOIMPL: u8 = 0xFF;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PteError {
    #[error("frame shorter than the 4-byte header + 4-byte CRC trailer")]
    Truncated,
    #[error("frame's declared payload length does not match its actual size")]
    LengthMismatch,
    #[error("frame CRC-32 trailer does not match its contents")]
    CrcMismatch,
    #[error("COBS decoding failed")]
    Cobs,
    #[error("perso record magic number does not match PersoDataV1")]
    BadMagic,
    #[error("perso record SHA-256 trailer does not match its contents")]
    HashMismatch,
    #[error("perso record is the wrong size for PersoDataV1")]
    BadSize,
    #[error("EE_READ/EE_WRITE offset or length runs past the EEPROM's end")]
    OutOfRange,
    #[error("malformed command payload")]
    BadPayload,
}

/// Pack one command/response: header (`cmd`, `tag`, `len`), `payload`,
/// `0xFF` padding to a 4-byte boundary, then a little-endian CRC-32 over
/// everything before it.
pub fn pack(cmd: u8, tag: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len() + 4 + 4);
    out.push(cmd);
    out.extend_from_slice(&tag.to_le_bytes());
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    while out.len() % 4 != 0 {
        out.push(0xFF);
    }
    let crc = CRC32.checksum(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Unpack a frame produced by [`pack`], returning `(cmd, tag, payload)`.
pub fn unpack(frame: &[u8]) -> Result<(u8, u16, Vec<u8>), PteError> {
    if frame.len() < 8 {
        return Err(PteError::Truncated);
    }
    let (body, trailer) = frame.split_at(frame.len() - 4);
    let crc = u32::from_le_bytes(trailer.try_into().unwrap());
    if CRC32.checksum(body) != crc {
        return Err(PteError::CrcMismatch);
    }
    let cmd = body[0];
    let tag = u16::from_le_bytes([body[1], body[2]]);
    let len = body[3] as usize;
    if 4 + len > body.len() {
        return Err(PteError::LengthMismatch);
    }
    Ok((cmd, tag, body[4..4 + len].to_vec()))
}

/// COBS-encode a packed frame and terminate it with the `0x00` delimiter
/// used on the wire. Uses the buffer-based `cobs::encode` rather than the
/// `use_std`-gated `encode_vec` so this builds with the crate's default
/// (no_std-friendly) feature set.
pub fn cobs_frame(packed: &[u8]) -> Vec<u8> {
    let mut dest = vec![0u8; packed.len() + packed.len() / 254 + 2];
    let n = cobs::encode(packed, &mut dest);
    dest.truncate(n);
    dest.push(0x00);
    dest
}

/// Split `buf` on the first `0x00` delimiter and COBS-decode the frame
/// ahead of it. Returns the decoded frame and the number of input bytes it
/// consumed (including the delimiter), so callers can keep feeding a
/// streaming buffer.
pub fn cobs_unframe(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PteError> {
    let Some(delim) = buf.iter().position(|&b| b == 0x00) else {
        return Ok(None);
    };
    let encoded = &buf[..delim];
    let mut dest = vec![0u8; encoded.len()];
    let n = cobs::decode(encoded, &mut dest).map_err(|_| PteError::Cobs)?;
    dest.truncate(n);
    Ok(Some((dest, delim + 1)))
}

const V1_MAGIC: u32 = 0xb2dc4db2;
/// `magic + hwid + region + reserved + serial + deveui + joineui + nwkkey + appkey`,
/// matching `perso.py`'s `V1_FORMAT_NH = '<IIII16s8s8s16s16s'`.
const V1_BODY_SIZE: usize = 4 + 4 + 4 + 4 + 16 + 8 + 8 + 16 + 16;
const V1_SIZE: usize = V1_BODY_SIZE + 32;

/// The EEPROM personalization record written by the test jig before first
/// boot. Field sizes and the trailing SHA-256 digest match `perso.py`'s
/// `PersoDataV1` dataclass exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersoDataV1 {
    pub hwid: u32,
    pub region: u32,
    pub serial: [u8; 16],
    pub deveui: [u8; 8],
    pub joineui: [u8; 8],
    pub nwkkey: [u8; 16],
    pub appkey: [u8; 16],
}

impl PersoDataV1 {
    pub const SIZE: usize = V1_SIZE;

    pub fn pack(&self) -> [u8; V1_SIZE] {
        let mut out = [0u8; V1_SIZE];
        out[0..4].copy_from_slice(&V1_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&self.hwid.to_le_bytes());
        out[8..12].copy_from_slice(&self.region.to_le_bytes());
        out[12..16].copy_from_slice(&0u32.to_le_bytes());
        out[16..32].copy_from_slice(&self.serial);
        out[32..40].copy_from_slice(&self.deveui);
        out[40..48].copy_from_slice(&self.joineui);
        out[48..64].copy_from_slice(&self.nwkkey);
        out[64..80].copy_from_slice(&self.appkey);
        let hash = Sha256::digest(&out[..V1_BODY_SIZE]);
        out[V1_BODY_SIZE..].copy_from_slice(&hash);
        out
    }

    pub fn unpack(raw: &[u8]) -> Result<PersoDataV1, PteError> {
        if raw.len() != V1_SIZE {
            return Err(PteError::BadSize);
        }
        let magic = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        if magic != V1_MAGIC {
            return Err(PteError::BadMagic);
        }
        let hash = Sha256::digest(&raw[..V1_BODY_SIZE]);
        if hash.as_slice() != &raw[V1_BODY_SIZE..] {
            return Err(PteError::HashMismatch);
        }
        Ok(PersoDataV1 {
            hwid: u32::from_le_bytes(raw[4..8].try_into().unwrap()),
            region: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
            serial: raw[16..32].try_into().unwrap(),
            deveui: raw[32..40].try_into().unwrap(),
            joineui: raw[40..48].try_into().unwrap(),
            nwkkey: raw[48..64].try_into().unwrap(),
            appkey: raw[64..80].try_into().unwrap(),
        })
    }
}

/// The device side of the protocol: dispatches incoming commands against a
/// backing EEPROM byte buffer (the `sim-emulator` EE region). `RUN` and
/// `RESET` are reported back to the caller rather than acted on directly,
/// since only the embedding simulator can actually resume or reset the CPU.
pub struct PteServer {
    ee: Vec<u8>,
}

/// What the caller of [`PteServer::handle`] should do after a command
/// completes successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteAction {
    None,
    Run,
    Reset,
}

impl PteServer {
    pub fn new(ee_size: usize) -> Self {
        PteServer { ee: vec![0u8; ee_size] }
    }

    pub fn from_image(ee: Vec<u8>) -> Self {
        PteServer { ee }
    }

    pub fn ee(&self) -> &[u8] {
        &self.ee
    }

    /// Dispatch one decoded `(cmd, payload)` pair, returning the response
    /// code, response payload, and any action the simulator must take.
    pub fn handle(&mut self, cmd: u8, payload: &[u8]) -> (u8, Vec<u8>, PteAction) {
        match cmd {
            CMD_NOP => (RES_NOP_ACK, Vec::new(), PteAction::None),
            CMD_RUN => (RES_OK, Vec::new(), PteAction::Run),
            CMD_RESET => (RES_OK, Vec::new(), PteAction::Reset),
            CMD_EE_READ => match self.ee_read(payload) {
                Ok(data) => (RES_OK, data, PteAction::None),
                Err(_) => (RES_EPARAM, Vec::new(), PteAction::None),
            },
            CMD_EE_WRITE => match self.ee_write(payload) {
                Ok(()) => (RES_OK, Vec::new(), PteAction::None),
                Err(_) => (RES_EPARAM, Vec::new(), PteAction::None),
            },
            _ => (RES_NOIMPL, Vec::new(), PteAction::None),
        }
    }

    /// Payload is `<HB>`: offset, length.
    fn ee_read(&self, payload: &[u8]) -> Result<Vec<u8>, PteError> {
        if payload.len() < 3 {
            return Err(PteError::BadPayload);
        }
        let offset = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        let len = payload[2] as usize;
        let end = offset.checked_add(len).ok_or(PteError::OutOfRange)?;
        if end > self.ee.len() {
            return Err(PteError::OutOfRange);
        }
        Ok(self.ee[offset..end].to_vec())
    }

    /// Payload is `<HH>` (offset, reserved) followed by the bytes to write.
    fn ee_write(&mut self, payload: &[u8]) -> Result<(), PteError> {
        if payload.len() < 4 {
            return Err(PteError::BadPayload);
        }
        let offset = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        let data = &payload[4..];
        let end = offset.checked_add(data.len()).ok_or(PteError::OutOfRange)?;
        if end > self.ee.len() {
            return Err(PteError::OutOfRange);
        }
        self.ee[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let packed = pack(CMD_EE_READ, 7, &[0x10, 0x00, 0x04]);
        let (cmd, tag, payload) = unpack(&packed).unwrap();
        assert_eq!(cmd, CMD_EE_READ);
        assert_eq!(tag, 7);
        assert_eq!(payload, vec![0x10, 0x00, 0x04]);
    }

    #[test]
    fn tampered_frame_fails_crc() {
        let mut packed = pack(CMD_NOP, 1, &[]);
        let last = packed.len() - 1;
        packed[last] ^= 0xFF;
        assert_eq!(unpack(&packed), Err(PteError::CrcMismatch));
    }

    #[test]
    fn cobs_frame_round_trips_through_a_zero_byte_payload() {
        let packed = pack(CMD_EE_WRITE, 2, &[0x00, 0x00, 0x00, 0x00, 1, 2, 3]);
        let wire = cobs_frame(&packed);
        assert!(!wire[..wire.len() - 1].contains(&0x00));
        let (decoded, consumed) = cobs_unframe(&wire).unwrap().unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(decoded, packed);
    }

    #[test]
    fn perso_record_pack_unpack_round_trips() {
        let rec = PersoDataV1 {
            hwid: 0x1234,
            region: 1,
            serial: *b"0000000000SER001",
            deveui: [1, 2, 3, 4, 5, 6, 7, 8],
            joineui: [8, 7, 6, 5, 4, 3, 2, 1],
            nwkkey: [0xAA; 16],
            appkey: [0xBB; 16],
        };
        let packed = rec.pack();
        assert_eq!(packed.len(), PersoDataV1::SIZE);
        assert_eq!(PersoDataV1::unpack(&packed).unwrap(), rec);
    }

    #[test]
    fn perso_record_rejects_corrupted_hash() {
        let rec = PersoDataV1 {
            hwid: 1,
            region: 0,
            serial: [0; 16],
            deveui: [0; 8],
            joineui: [0; 8],
            nwkkey: [0; 16],
            appkey: [0; 16],
        };
        let mut packed = rec.pack();
        packed[5] ^= 0xFF;
        assert_eq!(PersoDataV1::unpack(&packed), Err(PteError::HashMismatch));
    }

    #[test]
    fn server_ee_write_then_read_round_trips() {
        let mut server = PteServer::new(64);
        let (res, _, action) = server.handle(CMD_EE_WRITE, &[0x00, 0x00, 0x00, 0x00, 1, 2, 3, 4]);
        assert_eq!(res, RES_OK);
        assert_eq!(action, PteAction::None);
        let (res, data, _) = server.handle(CMD_EE_READ, &[0x00, 0x00, 4]);
        assert_eq!(res, RES_OK);
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn server_rejects_out_of_range_ee_access() {
        let mut server = PteServer::new(16);
        let (res, _, _) = server.handle(CMD_EE_READ, &[0x00, 0x00, 32]);
        assert_eq!(res, RES_EPARAM);
    }

    #[test]
    fn server_nop_answers_with_the_ack_byte_not_ok() {
        let mut server = PteServer::new(8);
        let (res, payload, action) = server.handle(CMD_NOP, &[]);
        assert_eq!(res, RES_NOP_ACK);
        assert!(payload.is_empty());
        assert_eq!(action, PteAction::None);
    }

    #[test]
    fn server_run_and_reset_report_their_action() {
        let mut server = PteServer::new(8);
        assert_eq!(server.handle(CMD_RUN, &[]).2, PteAction::Run);
        assert_eq!(server.handle(CMD_RESET, &[]).2, PteAction::Reset);
    }
}
