//! Building blocks for the MIC and FRMPayload crypto used by [`crate::keys`] and
//! [`crate::default_crypto`]: the B0/A_i block layouts from the LoRaWAN spec.

use crate::keys::{Encrypter, Mac, AES128, MIC};

pub mod generic_array {
    pub use aes::cipher::generic_array::{typenum, GenericArray};
}

use generic_array::GenericArray;

/// Computes `aes128_cmac(key, B0 | msg)[0..4]` for the Join-Request/Join-Accept MIC,
/// where B0 is implicit: those payloads MIC over the bytes as-is (no B0 prefix).
pub fn calculate_mic<M: Mac>(data: &[u8], mut mac: M) -> MIC {
    mac.input(data);
    let result = mac.result();
    MIC([result[0], result[1], result[2], result[3]])
}

/// Computes the data-message MIC: `aes128_cmac(key, B0 | msg)[0..4]`.
///
/// `data` is the full PHYPayload without the trailing 4-byte MIC (MHDR | FHDR | FPort | FRMPayload).
/// `dir` is 0 for uplink, 1 for downlink. `dev_addr` and `fcnt` are taken from the FHDR.
pub fn calculate_data_mic<M: Mac>(data: &[u8], mut mac: M, fcnt: u32) -> MIC {
    let dir = data[0] & 0x01;
    let dev_addr = &data[1..5];
    let b0 = build_b0(data.len() as u8, dir, dev_addr, fcnt);
    mac.input(&b0);
    mac.input(data);
    let result = mac.result();
    MIC([result[0], result[1], result[2], result[3]])
}

fn build_b0(msg_len: u8, dir: u8, dev_addr: &[u8], fcnt: u32) -> [u8; 16] {
    let mut b0 = [0u8; 16];
    b0[0] = 0x49;
    // bytes 1..5 are zero (RFU)
    b0[5] = dir;
    b0[6] = dev_addr[0];
    b0[7] = dev_addr[1];
    b0[8] = dev_addr[2];
    b0[9] = dev_addr[3];
    let fcnt_bytes = fcnt.to_le_bytes();
    b0[10] = fcnt_bytes[0];
    b0[11] = fcnt_bytes[1];
    b0[12] = fcnt_bytes[2];
    b0[13] = fcnt_bytes[3];
    // byte 14 is 0x00 (RFU)
    b0[15] = msg_len;
    b0
}

fn build_ai(dir: u8, dev_addr: &[u8], fcnt: u32, i: u8) -> [u8; 16] {
    let mut ai = [0u8; 16];
    ai[0] = 0x01;
    // bytes 1..5 are zero (RFU)
    ai[5] = dir;
    ai[6] = dev_addr[0];
    ai[7] = dev_addr[1];
    ai[8] = dev_addr[2];
    ai[9] = dev_addr[3];
    let fcnt_bytes = fcnt.to_le_bytes();
    ai[10] = fcnt_bytes[0];
    ai[11] = fcnt_bytes[1];
    ai[12] = fcnt_bytes[2];
    ai[13] = fcnt_bytes[3];
    // byte 14 is 0x00 (RFU)
    ai[15] = i;
    ai
}

/// Encrypts (or decrypts, since the cipher is symmetric) `data` in place using the
/// AES-CTR-like construction from the LoRaWAN spec (section 4.3.3).
pub fn encrypt_frm_data_payload<E: Encrypter>(
    data: &[u8],
    start: usize,
    end: usize,
    fcnt: u32,
    enc: &E,
) -> heapless::Vec<u8, 256> {
    let dir = data[0] & 0x01;
    let dev_addr = &data[1..5];
    let payload = &data[start..end];

    let mut out = heapless::Vec::new();
    let block_count = payload.len().div_ceil(16);
    for i in 0..block_count {
        let mut block: GenericArray<u8, generic_array::typenum::U16> =
            GenericArray::clone_from_slice(&build_ai(dir, dev_addr, fcnt, (i + 1) as u8));
        enc.encrypt_block(&mut block);
        let chunk_start = i * 16;
        let chunk_len = core::cmp::min(16, payload.len() - chunk_start);
        for j in 0..chunk_len {
            let _ = out.push(payload[chunk_start + j] ^ block[j]);
        }
    }
    out
}

/// Derives a LoRaWAN 1.0.x session key: `aes128_encrypt(AppKey, type_byte | AppNonce | NetId | DevNonce | pad16)`.
pub fn derive_session_key<E: Encrypter>(type_byte: u8, app_nonce: &[u8], net_id: &[u8], dev_nonce: &[u8], enc: &E) -> AES128 {
    let mut block: GenericArray<u8, generic_array::typenum::U16> = GenericArray::default();
    block[0] = type_byte;
    block[1..4].copy_from_slice(app_nonce);
    block[4..7].copy_from_slice(net_id);
    block[7..9].copy_from_slice(dev_nonce);
    enc.encrypt_block(&mut block);
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    AES128(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b0_layout_matches_spec() {
        let b0 = build_b0(23, 0, &[4, 3, 2, 1], 1);
        assert_eq!(b0[0], 0x49);
        assert_eq!(b0[15], 23);
        assert_eq!(&b0[6..10], &[4, 3, 2, 1]);
    }

    #[test]
    fn ai_layout_matches_spec() {
        let ai = build_ai(1, &[4, 3, 2, 1], 7, 1);
        assert_eq!(ai[0], 0x01);
        assert_eq!(ai[5], 1);
        assert_eq!(ai[15], 1);
    }
}
