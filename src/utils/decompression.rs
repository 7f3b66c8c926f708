use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use crate::errors::{DecodeError, DecodeResult};

/// Compression formats mirrors are known to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    Gzip,
    Uncompressed,
}

/// Magic byte detection and inflation of downloaded payloads
pub struct DecompressionService;

impl DecompressionService {
    pub fn detect_compression_format(data: &[u8]) -> CompressionFormat {
        match infer::get(data).map(|kind| kind.mime_type()) {
            Some("application/gzip") => CompressionFormat::Gzip,
            _ => CompressionFormat::Uncompressed,
        }
    }

    /// Inflates `data` if it carries a gzip header, otherwise returns it as-is
    ///
    /// Some mirrors hand out `.gz` files already decoded by a transparent
    /// proxy, so the file extension is not trusted.
    pub fn decompress(data: Bytes) -> DecodeResult<Vec<u8>> {
        match Self::detect_compression_format(&data) {
            CompressionFormat::Gzip => Self::decompress_gzip(&data),
            CompressionFormat::Uncompressed => Ok(data.to_vec()),
        }
    }

    fn decompress_gzip(data: &[u8]) -> DecodeResult<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| DecodeError::Decompression {
                message: format!("Failed to decompress gzip data: {}", e),
            })?;
        Ok(decompressed)
    }
}
