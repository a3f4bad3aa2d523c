//! Value codecs (`T <-> bytes`) and byte compression codecs.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Turns values into bytes and back.
pub trait Codec: Send + Sync + 'static {
    fn marshal<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>>;

    fn unmarshal<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON via serde_json. Human readable, handy when other languages read the
/// same store.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::SerializationError(e.to_string()))
    }

    fn unmarshal<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Magic bytes identifying a postcard envelope.
pub const CACHE_MAGIC: [u8; 4] = *b"CSTK";

/// Envelope schema version. Bump when the envelope layout changes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const ENVELOPE_HEADER_LEN: usize = 8;

/// Compact binary encoding via postcard inside a versioned envelope.
///
/// # Format
///
/// ```text
/// [MAGIC: 4 bytes] [VERSION: 4 bytes LE] [POSTCARD PAYLOAD]
/// ```
///
/// Entries written by an incompatible version are rejected with
/// [`Error::VersionMismatch`] rather than misread.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl Codec for PostcardCodec {
    fn marshal<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>> {
        let payload =
            postcard::to_allocvec(value).map_err(|e| Error::SerializationError(e.to_string()))?;

        let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
        out.extend_from_slice(&CACHE_MAGIC);
        out.extend_from_slice(&CURRENT_SCHEMA_VERSION.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn unmarshal<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        if bytes.len() < ENVELOPE_HEADER_LEN {
            return Err(Error::InvalidCacheEntry(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let (header, payload) = bytes.split_at(ENVELOPE_HEADER_LEN);
        if header[..4] != CACHE_MAGIC {
            return Err(Error::InvalidCacheEntry("bad magic header".to_string()));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&header[4..]);
        let version = u32::from_le_bytes(version);
        if version != CURRENT_SCHEMA_VERSION {
            return Err(Error::VersionMismatch {
                expected: CURRENT_SCHEMA_VERSION,
                found: version,
            });
        }

        postcard::from_bytes(payload).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Byte-to-byte compression. `decompress(compress(x)) == x` must hold.
pub trait CompressionCodec: Send + Sync + 'static {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>>;
}

/// Gzip via flate2.
#[cfg(feature = "gzip")]
#[derive(Debug, Clone, Copy)]
pub struct GzipCompression {
    level: flate2::Compression,
}

#[cfg(feature = "gzip")]
impl Default for GzipCompression {
    fn default() -> Self {
        GzipCompression {
            level: flate2::Compression::default(),
        }
    }
}

#[cfg(feature = "gzip")]
impl GzipCompression {
    /// Compression level from 0 (none) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        GzipCompression {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

#[cfg(feature = "gzip")]
impl CompressionCodec for GzipCompression {
    fn compress(&self, src: &[u8]) -> Result<Vec<u8>> {
        use std::io::Write;

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(src)
            .map_err(|e| Error::CompressionError(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Error::CompressionError(e.to_string()))
    }

    fn decompress(&self, src: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read;

        let mut decoder = flate2::read::GzDecoder::new(src);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::CompressionError(e.to_string()))?;
        Ok(out)
    }
}
