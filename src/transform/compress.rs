//! Gzip compression around the storage boundary.
//!
//! Compression happens after minification, as the last write-time stage;
//! decompression mirrors it as the first read-time stage so marker
//! substitution always sees the original text.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

pub fn compress(content: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    encoder.finish()
}

/// Fails on content that is not a complete gzip stream; callers treat
/// that as a missing cache entry.
pub fn decompress(content: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(content);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let original: Vec<u8> = (0u16..2048).map(|n| (n % 251) as u8).collect();
        let packed = compress(&original).expect("compress");
        let unpacked = decompress(&packed).expect("decompress");
        assert_eq!(unpacked, original);
    }

    #[test]
    fn round_trips_empty_input() {
        let packed = compress(b"").expect("compress");
        assert_eq!(decompress(&packed).expect("decompress"), b"");
    }

    #[test]
    fn repetitive_markup_shrinks() {
        let page = "<li>item</li>".repeat(500);
        let packed = compress(page.as_bytes()).expect("compress");
        assert!(packed.len() < page.len());
    }

    #[test]
    fn garbage_fails_to_decompress() {
        assert!(decompress(b"definitely not gzip").is_err());
    }
}
