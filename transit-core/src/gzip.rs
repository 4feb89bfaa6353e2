//! gzip helpers shared by the fetcher's archive writer and the gateway's
//! frame decoder.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

use crate::error::CoreError;

pub fn compress(raw: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

pub fn decompress(gzipped: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut decoder = GzDecoder::new(gzipped);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let raw = b"hello gtfs realtime feed";
        let gzipped = compress(raw).unwrap();
        assert_ne!(gzipped, raw);
        let back = decompress(&gzipped).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn decompress_garbage_fails() {
        assert!(decompress(b"not gzip data").is_err());
    }
}
