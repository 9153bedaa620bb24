//! Payload decompression.
//!
//! RealLive scenarios compress their bytecode with an LZSS variant: an
//! 8-bit flag word precedes up to eight tokens, a set bit signalling a
//! literal byte and a clear bit a 16-bit little-endian back-reference
//! packed as `(offset:12, length:4)` with a length bias of 2. The PACL
//! container uses the same scheme with the flag bits consumed from the
//! high end instead.

use crate::error::{Error, Result};
use crate::xor_key::XorKey;

/// Inflates a RealLive compressed region into exactly `expected_len`
/// bytes, applying the second obfuscation layer first when a key is given.
pub fn decompress(src: &[u8], expected_len: usize, key: Option<&XorKey>) -> Result<Vec<u8>> {
    match key {
        Some(key) => {
            let mut masked = src.to_vec();
            key.apply(&mut masked);
            inflate(&masked, expected_len, false)
        }
        None => inflate(src, expected_len, false),
    }
}

/// Inflates a PACL archive member (reverse-bit flag convention).
pub fn decompress_pacl(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    inflate(src, expected_len, true)
}

fn inflate(data: &[u8], expected_len: usize, rev_bits: bool) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0usize;

    'stream: while out.len() < expected_len {
        let Some(&flags) = data.get(pos) else {
            return Err(Error::InvalidScenario(
                "compressed stream ended early".into(),
            ));
        };
        pos += 1;

        for bit in 0..8 {
            if out.len() >= expected_len {
                break 'stream;
            }
            let literal = if rev_bits {
                flags & (0x80 >> bit) != 0
            } else {
                flags & (1 << bit) != 0
            };
            if literal {
                let Some(&byte) = data.get(pos) else {
                    return Err(Error::InvalidScenario(
                        "compressed stream ended early".into(),
                    ));
                };
                out.push(byte);
                pos += 1;
            } else {
                let Some(word) = data.get(pos..pos + 2) else {
                    return Err(Error::InvalidScenario(
                        "compressed stream ended early".into(),
                    ));
                };
                let word = u16::from_le_bytes([word[0], word[1]]);
                pos += 2;
                let offset = (word >> 4) as usize;
                let count = (word & 0x0f) as usize + 2;
                if offset == 0 || offset > out.len() {
                    return Err(Error::InvalidScenario(format!(
                        "back-reference to offset {offset} with only {} bytes produced",
                        out.len()
                    )));
                }
                for _ in 0..count {
                    let byte = out[out.len() - offset];
                    out.push(byte);
                }
            }
        }
    }

    // Back-reference runs may overshoot the declared length by a few
    // bytes; anything past it is padding.
    out.truncate(expected_len);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::lz_literal;

    #[test]
    fn literal_stream_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let compressed = lz_literal(&data);
        assert_eq!(decompress(&compressed, data.len(), None).unwrap(), data);
    }

    #[test]
    fn back_reference_repeats_earlier_output() {
        // Literals "abcd", then a back-reference four bytes back of length
        // 2 + 2: expands to "abcdabcd".
        let stream = vec![0x0f, b'a', b'b', b'c', b'd', (4 << 4) | 2, 0x00];
        assert_eq!(decompress(&stream, 8, None).unwrap(), b"abcdabcd");
    }

    #[test]
    fn overlapping_back_reference_repeats_one_byte() {
        // "x" then offset 1, count 5: run-length expansion.
        let stream = vec![0x01, b'x', (1 << 4) | 3, 0x00];
        assert_eq!(decompress(&stream, 6, None).unwrap(), b"xxxxxx");
    }

    #[test]
    fn pacl_flags_run_high_bit_first() {
        let data = b"PACLDATA".to_vec();
        // Same literal layout, flag byte still all-ones.
        let compressed = lz_literal(&data);
        assert_eq!(decompress_pacl(&compressed, data.len()).unwrap(), data);

        // A half-empty flag byte distinguishes the conventions: 0xF0
        // means four literals first under rev-bit, four backrefs under
        // the standard order.
        let stream = vec![0xf0, b'a', b'b', b'c', b'd'];
        assert_eq!(decompress_pacl(&stream, 4).unwrap(), b"abcd");
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let stream = vec![0xff, b'a'];
        assert!(decompress(&stream, 10, None).is_err());
    }

    #[test]
    fn bogus_back_reference_is_rejected() {
        let stream = vec![0x00, (9 << 4) | 2, 0x00];
        assert!(decompress(&stream, 4, None).is_err());
    }

    #[test]
    fn xor_layer_applies_before_inflation() {
        let key = XorKey::new([0x5a; 256]);
        let data = b"masked payload bytes".to_vec();
        let mut compressed = lz_literal(&data);
        key.apply(&mut compressed);
        assert_eq!(
            decompress(&compressed, data.len(), Some(&key)).unwrap(),
            data
        );
    }
}
