//! Compression codec for cached response bodies.
//!
//! Values are compressed exactly once when inserted and decompressed on every
//! read. Nothing caches the decompressed form.

use std::io::{self, Read, Write};

use bytes::Bytes;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to compress payload: {0}")]
    Compress(#[source] io::Error),
    #[error("stored payload is not valid compressed data: {0}")]
    Corrupt(#[source] io::Error),
}

/// A value that owns its compressed representation.
pub trait Compressor {
    /// Compress `raw` and keep the result, replacing any previous payload.
    fn compress(&mut self, raw: &[u8]) -> Result<(), CodecError>;

    /// Decompress the stored payload.
    fn uncompress(&self) -> Result<Vec<u8>, CodecError>;
}

/// Gzip-compressed response body with its creation time.
#[derive(Debug, Clone)]
pub struct CacheData {
    stored_at: OffsetDateTime,
    level: Compression,
    payload: Bytes,
}

impl CacheData {
    /// Empty container using the default gzip level.
    pub fn new() -> Self {
        Self::with_level(Compression::default().level())
    }

    /// Empty container compressing at `level` (clamped to 0..=9).
    pub fn with_level(level: u32) -> Self {
        Self {
            stored_at: OffsetDateTime::now_utc(),
            level: Compression::new(level.min(9)),
            payload: Bytes::new(),
        }
    }

    /// Wrap bytes that are already gzip-compressed.
    pub fn from_compressed(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::new()
        }
    }

    pub fn stored_at(&self) -> OffsetDateTime {
        self.stored_at
    }

    /// The gzip stream as stored.
    pub fn compressed(&self) -> &Bytes {
        &self.payload
    }

    pub fn compressed_len(&self) -> usize {
        self.payload.len()
    }
}

impl Default for CacheData {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for CacheData {
    fn compress(&mut self, raw: &[u8]) -> Result<(), CodecError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), self.level);
        encoder.write_all(raw).map_err(CodecError::Compress)?;
        let compressed = encoder.finish().map_err(CodecError::Compress)?;

        self.payload = Bytes::from(compressed);
        Ok(())
    }

    fn uncompress(&self) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(self.payload.as_ref());
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw).map_err(CodecError::Corrupt)?;
        Ok(raw)
    }
}
