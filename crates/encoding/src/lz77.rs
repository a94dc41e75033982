//! LZ77 decompression matching the GBA BIOS `LZ77UnCompWram`/
//! `LZ77UnCompVram` SWI calls (0x11/0x12).
//!
//! The stream is a sequence of 8-flag blocks: one control byte followed by
//! up to eight tokens, MSB first. A `0` flag bit is one literal byte; a `1`
//! flag bit is a back-reference encoded in two bytes:
//!
//! `[0:4]=length-3  [4:8]=disp_hi  [8:16]=disp_lo`, i.e. the first byte's
//! low nibble and the second byte together form a 12-bit displacement
//! (`disp = ((b0 & 0x0f) << 8) | b1`, copy from `out.len() - disp - 1`),
//! and the first byte's high nibble is `length - 3` (3..=18 bytes).

use gba_core_common::error::Error;

use crate::codec::Codec;

pub struct Lz77;

impl Codec for Lz77 {
    fn decode(data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, Error> {
        decode_lz77(data, uncompressed_size)
    }
}

pub fn decode_lz77(data: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, Error> {
    let mut output = Vec::with_capacity(uncompressed_size as usize);
    let mut cursor = 0usize;
    let truncated = || Error::CustomError(String::from("LZ77 stream truncated"));

    while output.len() < uncompressed_size as usize {
        let flags = *data.get(cursor).ok_or_else(truncated)?;
        cursor += 1;

        for bit in (0..8).rev() {
            if output.len() >= uncompressed_size as usize {
                break;
            }
            if flags & (1 << bit) == 0 {
                let byte = *data.get(cursor).ok_or_else(truncated)?;
                cursor += 1;
                output.push(byte);
            } else {
                let b0 = *data.get(cursor).ok_or_else(truncated)?;
                let b1 = *data.get(cursor + 1).ok_or_else(truncated)?;
                cursor += 2;

                let length = ((b0 >> 4) as usize) + 3;
                let disp = (((b0 & 0x0f) as usize) << 8) | b1 as usize;

                if disp + 1 > output.len() {
                    return Err(Error::CustomError(String::from(
                        "LZ77 back-reference out of range",
                    )));
                }
                let start = output.len() - disp - 1;
                for i in 0..length {
                    let byte = output[start + i];
                    output.push(byte);
                }
            }
        }
    }

    output.truncate(uncompressed_size as usize);
    Ok(output)
}

/// Encodes `data` with literal-only blocks (no back-references). Produces
/// a valid, if unoptimized, LZ77 stream that `decode_lz77` can round-trip;
/// used by tests and by BIOS-fixture generation.
pub fn encode_lz77_literal(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::new();
    for chunk in data.chunks(8) {
        encoded.push(0x00);
        encoded.extend_from_slice(chunk);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::{decode_lz77, encode_lz77_literal};

    #[test]
    fn test_literal_round_trip() {
        let data: Vec<u8> = (0..20u8).collect();
        let encoded = encode_lz77_literal(&data);
        let decoded = decode_lz77(&encoded, data.len() as u32).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_back_reference() {
        // Literal block "AB", then a back-reference of length 3, disp 1
        // (copy from two bytes back), reproducing "ABABAB".
        let encoded = [0b0000_0000u8, b'A', b'B', 0b1000_0000, 0x01, 0x01];
        let decoded = decode_lz77(&encoded, 6).unwrap();
        assert_eq!(decoded, b"ABABAB");
    }

    #[test]
    fn test_out_of_range_reference_errors() {
        let encoded = [0b1000_0000u8, 0x00, 0x00];
        assert!(decode_lz77(&encoded, 3).is_err());
    }
}
