//! FUOTA fragment framing and reassembly. Grounded in
//! `original_source/projects/ex-fuota/fragger.py`, which packs
//! `struct.pack('<HHHH', src_crc, dst_crc, cct, idx)` ahead of each chunk
//! and delivers it as a downlink on the update application's port.
//!
//! Simplified from the original's rateless carousel (random `idx` in
//! `1..=65535`, independent of the actual fragment count, intended for an
//! erasure-coded delivery channel) to a plain 1-based index into the source
//! data's fixed-size chunks: `idx` in `1..=chunk_count` maps directly to one
//! chunk, and the session completes once every index has been seen once.
//! This keeps the reassembler a pure accumulate-by-index operation, which is
//! what `SPEC_FULL.md` calls for.

use std::collections::BTreeMap;

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FuotaError {
    #[error("fragment belongs to a different session (src_crc/dst_crc/chunk_count mismatch)")]
    SessionMismatch,
    #[error("fragment index {idx} is out of range for chunk_count {chunk_count}")]
    IndexOutOfRange { idx: u16, chunk_count: u16 },
    #[error("reassembly requested before every fragment index arrived ({have}/{chunk_count})")]
    Incomplete { have: u16, chunk_count: u16 },
    #[error("reassembled data's CRC does not match dst_crc")]
    CrcMismatch,
}

/// The 16-bit truncated CRC-32 the original tool calls a "short CRC".
pub fn short_crc(data: &[u8]) -> u16 {
    (CRC32.checksum(data) & 0xffff) as u16
}

/// One FUOTA downlink payload: an 8-byte session header followed by one
/// chunk of the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub src_crc: u16,
    pub dst_crc: u16,
    pub chunk_count: u16,
    pub idx: u16,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.data.len());
        out.extend_from_slice(&self.src_crc.to_le_bytes());
        out.extend_from_slice(&self.dst_crc.to_le_bytes());
        out.extend_from_slice(&self.chunk_count.to_le_bytes());
        out.extend_from_slice(&self.idx.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(raw: &[u8]) -> Option<Fragment> {
        if raw.len() < 8 {
            return None;
        }
        Some(Fragment {
            src_crc: u16::from_le_bytes(raw[0..2].try_into().unwrap()),
            dst_crc: u16::from_le_bytes(raw[2..4].try_into().unwrap()),
            chunk_count: u16::from_le_bytes(raw[4..6].try_into().unwrap()),
            idx: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            data: raw[8..].to_vec(),
        })
    }
}

/// Split `data` into `frag_size`-byte chunks (the last one shorter if it
/// doesn't divide evenly), indexed `1..=chunk_count`. `src_crc` is the short
/// CRC of the firmware this update is a delta against, or `0` for a
/// full-image update.
pub fn fragment(data: &[u8], frag_size: usize, src_crc: u16) -> Vec<Fragment> {
    assert!(frag_size > 0, "frag_size must be positive");
    let dst_crc = short_crc(data);
    let chunks: Vec<&[u8]> = data.chunks(frag_size).collect();
    let chunk_count = chunks.len() as u16;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Fragment { src_crc, dst_crc, chunk_count, idx: i as u16 + 1, data: chunk.to_vec() })
        .collect()
}

/// Accumulates fragments for one update session by index, ignoring
/// duplicates, until every index `1..=chunk_count` has arrived.
pub struct Reassembler {
    src_crc: u16,
    dst_crc: u16,
    chunk_count: u16,
    chunks: BTreeMap<u16, Vec<u8>>,
}

impl Reassembler {
    pub fn new(src_crc: u16, dst_crc: u16, chunk_count: u16) -> Self {
        Reassembler { src_crc, dst_crc, chunk_count, chunks: BTreeMap::new() }
    }

    /// Feed one fragment in. Returns `true` once every index has arrived.
    /// Fragments from a different session (mismatched header fields) or
    /// with `idx` outside `1..=chunk_count` are rejected without touching
    /// the accumulated state.
    pub fn accept(&mut self, frag: &Fragment) -> Result<bool, FuotaError> {
        if frag.src_crc != self.src_crc || frag.dst_crc != self.dst_crc || frag.chunk_count != self.chunk_count {
            return Err(FuotaError::SessionMismatch);
        }
        if frag.idx == 0 || frag.idx > self.chunk_count {
            return Err(FuotaError::IndexOutOfRange { idx: frag.idx, chunk_count: self.chunk_count });
        }
        self.chunks.entry(frag.idx).or_insert_with(|| frag.data.clone());
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.len() as u16 == self.chunk_count
    }

    pub fn progress(&self) -> (u16, u16) {
        (self.chunks.len() as u16, self.chunk_count)
    }

    /// Concatenate every chunk in index order and verify `dst_crc`.
    pub fn finish(&self) -> Result<Vec<u8>, FuotaError> {
        if !self.is_complete() {
            return Err(FuotaError::Incomplete { have: self.chunks.len() as u16, chunk_count: self.chunk_count });
        }
        let mut out = Vec::new();
        for idx in 1..=self.chunk_count {
            out.extend_from_slice(&self.chunks[&idx]);
        }
        if short_crc(&out) != self.dst_crc {
            return Err(FuotaError::CrcMismatch);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_reassemble_in_any_arrival_order() {
        let data: Vec<u8> = (0..300u32).map(|b| b as u8).collect();
        let frags = fragment(&data, 128, 0);
        assert_eq!(frags.len(), 3);

        let mut reasm = Reassembler::new(0, frags[0].dst_crc, frags[0].chunk_count);
        assert!(!reasm.accept(&frags[2]).unwrap());
        assert!(!reasm.accept(&frags[0]).unwrap());
        assert!(reasm.accept(&frags[1]).unwrap());
        assert_eq!(reasm.finish().unwrap(), data);
    }

    #[test]
    fn duplicate_fragments_are_ignored() {
        let data = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let frags = fragment(&data, 4, 0);
        let mut reasm = Reassembler::new(0, frags[0].dst_crc, frags[0].chunk_count);
        reasm.accept(&frags[0]).unwrap();
        assert!(reasm.accept(&frags[0]).unwrap() == false);
        assert!(reasm.accept(&frags[1]).unwrap());
    }

    #[test]
    fn wrong_session_header_is_rejected() {
        let data = vec![1u8, 2, 3, 4];
        let frags = fragment(&data, 4, 0);
        let mut reasm = Reassembler::new(0, frags[0].dst_crc.wrapping_add(1), frags[0].chunk_count);
        assert_eq!(reasm.accept(&frags[0]), Err(FuotaError::SessionMismatch));
    }

    #[test]
    fn encode_decode_round_trips() {
        let frag = Fragment { src_crc: 1, dst_crc: 2, chunk_count: 3, idx: 1, data: vec![9, 9, 9] };
        let raw = frag.encode();
        assert_eq!(Fragment::decode(&raw).unwrap(), frag);
    }
}
