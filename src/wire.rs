//! Wire Encoding
//!
//! Length-prefixed, checksummed framing for payload units. Every node of the
//! same protocol version must use this encoding identically; transports built
//! on byte streams can mount [`DistroCodec`] directly.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::entity::{DigestEntry, DistroData};
use crate::error::{Error, Result};

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Body length
    pub length: u32,
    /// Body checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a header for a body
    pub fn new(body: &[u8]) -> Self {
        Self {
            length: body.len() as u32,
            checksum: crc32fast::hash(body),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            length: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            checksum: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
        }
    }
}

/// Encode a payload unit into one framed buffer
pub fn encode(data: &DistroData) -> Result<Vec<u8>> {
    let body = bincode::serialize(data)?;
    let header = FrameHeader::new(&body);
    let mut framed = Vec::with_capacity(FrameHeader::SIZE + body.len());
    framed.extend_from_slice(&header.to_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decode one framed buffer back into a payload unit
pub fn decode(framed: &[u8]) -> Result<DistroData> {
    if framed.len() < FrameHeader::SIZE {
        return Err(Error::Frame("frame shorter than header".to_string()));
    }
    let header = FrameHeader::from_bytes(framed[..FrameHeader::SIZE].try_into().unwrap());
    let body = &framed[FrameHeader::SIZE..];
    if body.len() != header.length as usize {
        return Err(Error::Frame(format!(
            "frame length mismatch: header says {}, got {}",
            header.length,
            body.len()
        )));
    }
    if crc32fast::hash(body) != header.checksum {
        return Err(Error::Frame("frame checksum mismatch".to_string()));
    }
    Ok(bincode::deserialize(body)?)
}

/// Serialize a verify digest into payload content
pub fn encode_digest(entries: &[DigestEntry]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(entries)?)
}

/// Deserialize a verify digest from payload content
pub fn decode_digest(content: &[u8]) -> Result<Vec<DigestEntry>> {
    Ok(bincode::deserialize(content)?)
}

/// Stream codec carrying framed payload units
#[derive(Debug, Default)]
pub struct DistroCodec;

impl Encoder<DistroData> for DistroCodec {
    type Error = Error;

    fn encode(&mut self, item: DistroData, dst: &mut BytesMut) -> Result<()> {
        let body = bincode::serialize(&item)?;
        let header = FrameHeader::new(&body);
        dst.reserve(FrameHeader::SIZE + body.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

impl Decoder for DistroCodec {
    type Item = DistroData;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DistroData>> {
        if src.len() < FrameHeader::SIZE {
            return Ok(None);
        }
        let header = FrameHeader::from_bytes(src[..FrameHeader::SIZE].try_into().unwrap());
        let frame_len = FrameHeader::SIZE + header.length as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }
        src.advance(FrameHeader::SIZE);
        let body = src.split_to(header.length as usize);
        if crc32fast::hash(&body) != header.checksum {
            return Err(Error::Frame("frame checksum mismatch".to_string()));
        }
        Ok(Some(bincode::deserialize(&body)?))
    }
}
