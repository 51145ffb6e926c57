//! Compression algorithm selection and backends.

use std::io::{Read, Write};
use std::str::FromStr;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use relay_core::{RelayError, RelayResult};

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Gzip,
    Zlib,
    Lz4,
    /// Pass-through; payloads are never wrapped.
    None,
}

impl CompressionAlgorithm {
    /// Wire string, used in the compressed envelope.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zlib => "zlib",
            Self::Lz4 => "lz4",
            Self::None => "none",
        }
    }

    /// The algorithms worth benchmarking (everything but pass-through).
    pub fn all_real() -> [CompressionAlgorithm; 3] {
        [Self::Gzip, Self::Zlib, Self::Lz4]
    }

    /// Compress a byte slice. Internal helper; the public compressor API
    /// never lets this error escape.
    pub(crate) fn compress(self, data: &[u8], level: u32) -> RelayResult<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::None => Ok(data.to_vec()),
        }
    }

    /// Decompress a byte slice produced by [`Self::compress`].
    pub(crate) fn decompress(self, data: &[u8]) -> RelayResult<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut decoder = GzDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::Zlib => {
                let mut decoder = ZlibDecoder::new(data);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| RelayError::decompression(format!("lz4 decompress failed: {e}"))),
            Self::None => Ok(data.to_vec()),
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" => Ok(Self::Gzip),
            "zlib" => Ok(Self::Zlib),
            "lz4" => Ok(Self::Lz4),
            "none" => Ok(Self::None),
            other => Err(RelayError::configuration(format!(
                "Unsupported compression algorithm: {other}"
            ))),
        }
    }
}
