// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload compression.

use {
    crate::{Error, PackageResult},
    flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression},
    std::{
        fmt::Debug,
        io::{Read, Write},
    },
};

/// Upper bound on the initial decode buffer relative to the input size.
const MAX_INITIAL_RATIO: usize = 4;

/// Compresses and decompresses resource payloads.
///
/// Implementations must be deterministic. Decompression must fail when the
/// input is corrupt or does not decode to exactly `expected_length` bytes
/// rather than returning a truncated or padded buffer.
pub trait CompressionAdapter: Debug + Send + Sync {
    fn compress(&self, data: &[u8]) -> PackageResult<Vec<u8>>;

    fn decompress(&self, data: &[u8], expected_length: usize) -> PackageResult<Vec<u8>>;
}

/// zlib compression, as used by DBPF 2.x packages.
#[derive(Clone, Copy, Debug)]
pub struct ZlibCompression {
    level: u32,
}

impl Default for ZlibCompression {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl ZlibCompression {
    /// Construct an instance with an explicit compression level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

impl CompressionAdapter for ZlibCompression {
    fn compress(&self, data: &[u8]) -> PackageResult<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;

        Ok(encoder.finish()?)
    }

    fn decompress(&self, data: &[u8], expected_length: usize) -> PackageResult<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);

        // Read one byte past the expected length so oversized streams are
        // detected without decoding them in full. The expected length comes
        // from the index and is not trusted for the initial allocation.
        let mut decoded = Vec::with_capacity(
            expected_length.min(data.len().saturating_mul(MAX_INITIAL_RATIO)),
        );
        (&mut decoder)
            .take(expected_length as u64 + 1)
            .read_to_end(&mut decoded)
            .map_err(|e| Error::Compression(format!("zlib: {}", e)))?;

        if decoded.len() != expected_length {
            return Err(Error::DecompressedSize {
                expected: expected_length,
                actual: decoded.len(),
            });
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_round_trip() -> PackageResult<()> {
        let zlib = ZlibCompression::default();

        for data in [vec![], vec![42], vec![0u8; 65536], b"hello world".to_vec()] {
            let compressed = zlib.compress(&data)?;
            assert_eq!(zlib.decompress(&compressed, data.len())?, data);
        }

        Ok(())
    }

    #[test]
    fn zlib_shrinks_repetitive_data() -> PackageResult<()> {
        let compressed = ZlibCompression::default().compress(&[0u8; 500])?;
        assert!(compressed.len() < 500);

        Ok(())
    }

    #[test]
    fn zlib_length_mismatch() -> PackageResult<()> {
        let zlib = ZlibCompression::with_level(9);
        let compressed = zlib.compress(&[7u8; 100])?;

        assert!(matches!(
            zlib.decompress(&compressed, 99),
            Err(Error::DecompressedSize {
                expected: 99,
                actual: 100
            })
        ));
        assert!(matches!(
            zlib.decompress(&compressed, 101),
            Err(Error::DecompressedSize {
                expected: 101,
                actual: 100
            })
        ));

        Ok(())
    }

    #[test]
    fn zlib_huge_expected_length() -> PackageResult<()> {
        let zlib = ZlibCompression::default();
        let compressed = zlib.compress(b"small")?;

        assert!(matches!(
            zlib.decompress(&compressed, 0xffff_fff0),
            Err(Error::DecompressedSize {
                expected: 0xffff_fff0,
                actual: 5
            })
        ));

        Ok(())
    }

    #[test]
    fn zlib_corrupt_input() {
        let zlib = ZlibCompression::default();
        assert!(zlib.decompress(b"definitely not zlib", 10).is_err());
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZlibCompression::with_level(42).level(), 9);
    }
}
