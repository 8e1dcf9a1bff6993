//! Gzip body codec.
//!
//! Outbound request bodies are compressed with the fastest gzip level; the
//! payloads are small JSON documents so ratio matters less than latency.

use std::io;
use std::io::Read;
use std::io::Write;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Gzip-compress a request body.
pub fn compress(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(body)?;
    encoder.finish()
}

/// Decompress a gzip-encoded request body.
pub fn decompress(body: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
