use gba_core_common::error::Error;

/// Shared shape for the BIOS decompression codecs.
///
/// Every GBA BIOS decompression SWI is preceded by a common 4-byte header
/// (a type nibble plus a 24-bit little-endian uncompressed size) read by
/// the caller; these codecs operate purely on the compressed payload that
/// follows it.
pub trait Codec {
    fn decode(data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, Error>;
}
