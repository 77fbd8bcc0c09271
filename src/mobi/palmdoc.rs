//! PalmDOC LZ77 codec.
//!
//! | byte        | meaning                                             |
//! |-------------|-----------------------------------------------------|
//! | `0x00`      | literal NUL                                         |
//! | `0x01-0x08` | copy that many following bytes literally            |
//! | `0x09-0x7F` | literal byte                                        |
//! | `0x80-0xBF` | with the next byte: 11-bit distance, 3-bit length+3 |
//! | `0xC0-0xFF` | space followed by `byte ^ 0x80`                     |
//!
//! A back-reference only ever reads output already produced, so decoding
//! works record by record with bounded lookback.

/// Longest distance a back-reference can encode.
pub const MAX_DISTANCE: usize = 2047;

/// Decode one PalmDOC record.
///
/// Malformed input never panics: a truncated literal run copies what is
/// left, a dangling back-reference byte is dropped, and a back-reference
/// whose distance is 0 or reaches before the start of the output emits
/// `length` NUL bytes instead.
pub fn decompress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() * 2);
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        i += 1;

        match c {
            0x01..=0x08 => {
                let end = (i + c as usize).min(input.len());
                output.extend_from_slice(&input[i..end]);
                i = end;
            }
            0x00 | 0x09..=0x7F => output.push(c),
            0xC0..=0xFF => {
                output.push(b' ');
                output.push(c ^ 0x80);
            }
            0x80..=0xBF => {
                let Some(&next) = input.get(i) else {
                    break;
                };
                i += 1;

                let combined = ((c as u16) << 8) | next as u16;
                let distance = ((combined & 0x3FFF) >> 3) as usize;
                let length = ((combined & 0x07) + 3) as usize;

                if distance == 0 || distance > output.len() {
                    output.resize(output.len() + length, 0);
                } else {
                    // Byte-at-a-time: the source may overlap what we write.
                    for _ in 0..length {
                        let byte = output[output.len() - distance];
                        output.push(byte);
                    }
                }
            }
        }
    }

    output
}

/// Encode bytes as a PalmDOC record.
///
/// Greedy: tries the longest back-reference first, then the space+ASCII
/// pair, then literals.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if let Some((distance, len)) = longest_match(input, i) {
            let compound = (distance << 3) | (len - 3);
            output.push(0x80 | (compound >> 8) as u8);
            output.push((compound & 0xFF) as u8);
            i += len;
            continue;
        }

        let c = input[i];
        i += 1;

        if c == b' '
            && let Some(&next) = input.get(i)
            && (0x40..=0x7F).contains(&next)
        {
            output.push(next ^ 0x80);
            i += 1;
            continue;
        }

        if c == 0 || (0x09..0x80).contains(&c) {
            output.push(c);
            continue;
        }

        // Run of bytes that need escaping, at most 8 per marker.
        let start = i - 1;
        while i < input.len() && i - start < 8 {
            let next = input[i];
            if next == 0 || (0x09..0x80).contains(&next) {
                break;
            }
            i += 1;
        }
        output.push((i - start) as u8);
        output.extend_from_slice(&input[start..i]);
    }

    output
}

fn longest_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let window_start = pos.saturating_sub(MAX_DISTANCE);
    for len in (3..=10).rev() {
        if pos + len > data.len() || pos < len {
            continue;
        }
        let pattern = &data[pos..pos + len];
        let found = (window_start..=pos - len)
            .rev()
            .find(|&j| &data[j..j + len] == pattern);
        if let Some(j) = found {
            return Some((pos - j, len));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompress_literal() {
        assert_eq!(decompress(b"Hello"), b"Hello");
    }

    #[test]
    fn test_decompress_space_ascii() {
        // 'A' ^ 0x80 = 0xC1
        assert_eq!(decompress(&[0xC1]), b" A");
    }

    #[test]
    fn test_decompress_literal_run() {
        assert_eq!(decompress(&[0x03, 0xE9, 0x00, 0x81, b'x']), &[0xE9, 0x00, 0x81, b'x']);
    }

    #[test]
    fn test_decompress_back_reference() {
        // "abc" then distance 3, length 3.
        let compound: u16 = (3 << 3) | 0;
        let input = [b'a', b'b', b'c', 0x80 | (compound >> 8) as u8, compound as u8];
        assert_eq!(decompress(&input), b"abcabc");
    }

    #[test]
    fn test_decompress_overlapping_reference() {
        // "ab" then distance 2, length 6.
        let compound: u16 = (2 << 3) | 3;
        let input = [b'a', b'b', 0x80 | (compound >> 8) as u8, compound as u8];
        assert_eq!(decompress(&input), b"abababab");
    }

    #[test]
    fn test_decompress_malformed_zero_fills() {
        // Literal run, a back-reference 100 bytes back with only 2 produced,
        // then a space+literal.
        let compound: u16 = (100 << 3) | 2;
        let input = [0x02, b'h', b'i', 0x80 | (compound >> 8) as u8, compound as u8, 0xC1];
        assert_eq!(decompress(&input), b"hi\0\0\0\0\0 A");
    }

    #[test]
    fn test_decompress_truncated_input() {
        assert_eq!(decompress(&[0x05, b'a']), b"a");
        assert_eq!(decompress(&[b'a', 0x80]), b"a");
    }

    #[test]
    fn test_roundtrip() {
        let original = b"Hello, World! This is a test of PalmDOC compression. Hello, World!";
        let compressed = compress(original);
        assert!(compressed.len() < original.len());
        assert_eq!(decompress(&compressed), original);
    }

    #[test]
    fn test_roundtrip_binary() {
        let original = [0x01u8, 0xFF, 0x80, b' ', 0x90, b'a', 0x00, 0x05];
        assert_eq!(decompress(&compress(&original)), original);
    }
}
