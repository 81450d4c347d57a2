// Log frame header layout, alignment helpers, and payload checksums for the store log.
use sha2::{Digest, Sha256};

use crate::core::error::{Error, ErrorKind};

pub const FRAME_MAGIC: [u8; 4] = *b"REC1";
pub const FRAME_HEADER_LEN: usize = 32;
pub const CHECKSUM_LEN: usize = 16;
pub const MAX_PAYLOAD_ABS: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub header_len: u32,
    pub payload_len: u32,
    pub payload_len_xor: u32,
    pub checksum: [u8; CHECKSUM_LEN],
}

impl FrameHeader {
    pub fn for_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() > MAX_PAYLOAD_ABS {
            return Err(Error::new(ErrorKind::Usage).with_message("record exceeds max payload size"));
        }
        let payload_len = payload.len() as u32;
        Ok(Self {
            header_len: FRAME_HEADER_LEN as u32,
            payload_len,
            payload_len_xor: payload_len ^ 0xFFFF_FFFF,
            checksum: checksum(payload),
        })
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut buf = [0u8; FRAME_HEADER_LEN];
        buf[0..4].copy_from_slice(&FRAME_MAGIC);
        write_u32(&mut buf, 4, self.header_len);
        write_u32(&mut buf, 8, self.payload_len);
        write_u32(&mut buf, 12, self.payload_len_xor);
        buf[16..16 + CHECKSUM_LEN].copy_from_slice(&self.checksum);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < FRAME_HEADER_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("frame header too small"));
        }
        if buf[0..4] != FRAME_MAGIC {
            return Err(Error::new(ErrorKind::Corrupt).with_message("bad frame magic"));
        }
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&buf[16..16 + CHECKSUM_LEN]);
        Ok(Self {
            header_len: read_u32(buf, 4),
            payload_len: read_u32(buf, 8),
            payload_len_xor: read_u32(buf, 12),
            checksum,
        })
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.header_len as usize != FRAME_HEADER_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("unexpected header length"));
        }
        if self.payload_len ^ self.payload_len_xor != 0xFFFF_FFFF {
            return Err(Error::new(ErrorKind::Corrupt).with_message("payload length xor mismatch"));
        }
        if self.payload_len as usize > MAX_PAYLOAD_ABS {
            return Err(Error::new(ErrorKind::Corrupt).with_message("payload length exceeds max"));
        }
        Ok(())
    }

    pub fn matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.payload_len as usize && checksum(payload) == self.checksum
    }

    pub fn total_len(&self) -> usize {
        frame_total_len(FRAME_HEADER_LEN, self.payload_len as usize)
    }
}

/// Header, payload, and zero padding ready to append to the log.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, Error> {
    let header = FrameHeader::for_payload(payload)?;
    let mut buf = Vec::with_capacity(header.total_len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf.resize(header.total_len(), 0);
    Ok(buf)
}

pub fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

pub fn align8(value: usize) -> usize {
    (value + 7) & !7
}

pub fn frame_total_len(header_len: usize, payload_len: usize) -> usize {
    align8(header_len + payload_len)
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(out)
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
