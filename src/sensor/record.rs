//! Fixed 16-byte measurement record.
//!
//! Layout:
//! - bytes 0..8: timestamp, unsigned, little-endian
//! - bytes 8..12: value type id, unsigned, little-endian
//! - bytes 12..16: IEEE-754 `f32` in the host's native byte order
//!
//! No range checks happen here; duplicate or odd values are the store's concern.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const RECORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    /// Producer-defined epoch and unit. Stored as the same 64 bits, signed.
    pub time: u64,
    pub type_id: u32,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The source produced no bytes at all.
    EndOfStream,
    /// Fewer than [`RECORD_LEN`] bytes were available.
    ShortRead { len: usize },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EndOfStream => write!(f, "end of stream"),
            DecodeError::ShortRead { len } => {
                write!(f, "short read: got {} of {} bytes", len, RECORD_LEN)
            }
        }
    }
}

impl Error for DecodeError {}

impl Record {
    pub fn decode(buf: &[u8; RECORD_LEN]) -> Self {
        Record {
            time: u64::from_le_bytes(field(buf, 0)),
            type_id: u32::from_le_bytes(field(buf, 8)),
            value: f32::from_ne_bytes(field(buf, 12)),
        }
    }

    /// Decode the first [`RECORD_LEN`] bytes of `buf`.
    pub fn from_slice(buf: &[u8]) -> Result<Self, DecodeError> {
        match buf.len() {
            0 => Err(DecodeError::EndOfStream),
            len if len < RECORD_LEN => Err(DecodeError::ShortRead { len }),
            _ => {
                let mut fixed = [0u8; RECORD_LEN];
                fixed.copy_from_slice(&buf[..RECORD_LEN]);
                Ok(Self::decode(&fixed))
            }
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[..8].copy_from_slice(&self.time.to_le_bytes());
        buf[8..12].copy_from_slice(&self.type_id.to_le_bytes());
        buf[12..].copy_from_slice(&self.value.to_ne_bytes());
        buf
    }

    /// Timestamp as stored: the same bits reinterpreted as `i64`.
    pub fn stored_time(&self) -> i64 {
        self.time as i64
    }
}

fn field<const N: usize>(buf: &[u8; RECORD_LEN], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}
