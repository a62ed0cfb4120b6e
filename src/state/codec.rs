//! Checkpoint snapshot codecs.
//!
//! A codec transforms the serialized snapshot at store time and reverses it at
//! restore time. Every codec must round-trip exactly.

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::Result;

/// Reversible transform applied to stored snapshots.
pub trait CheckpointCodec: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>>;
}

/// Stores snapshots as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl CheckpointCodec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        Ok(stored.to_vec())
    }
}

/// Deflate-compressed snapshots.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
}

impl DeflateCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::fast(),
        }
    }
}

impl CheckpointCodec for DeflateCodec {
    fn name(&self) -> &'static str {
        "deflate"
    }

    fn encode(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, stored: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = DeflateDecoder::new(stored);
        let mut out = Vec::with_capacity(stored.len() * 2);
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
