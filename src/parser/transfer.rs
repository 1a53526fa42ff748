//! Content-Transfer-Encoding decoders (RFC 2045 §6).

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Base64 engine tolerant of missing or superfluous padding, as found in
/// the wild.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode base64, ignoring line breaks and other whitespace.
pub fn decode_base64(input: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(compact).ok()
}

/// Decode a quoted-printable body: `=XX` escapes and soft line breaks
/// (`=\r\n`, `=\n`). Malformed escapes are kept literally.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        match input.get(i + 1..i + 3) {
            Some(&[b'\r', b'\n']) => i += 3,
            Some(&[b'\n', _]) => i += 2,
            Some(&[hi, lo]) => match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            // "=" at end of input, or "=\n" as the last two bytes
            _ => {
                if input.get(i + 1) == Some(&b'\n') {
                    i += 2;
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
        }
    }
    out
}

/// Decode RFC 2047 Q-encoding: underscores are spaces, `=XX` is a byte.
pub fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        result.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_with_line_breaks() {
        let decoded = decode_base64(b"aGVsbG8g\r\nd29ybGQ=\r\n").expect("valid base64");
        assert_eq!(decoded, b"hello world");
    }

    #[test]
    fn test_base64_missing_padding() {
        assert_eq!(decode_base64(b"aGk").as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn test_base64_rejects_garbage() {
        assert!(decode_base64(b"***").is_none());
    }

    #[test]
    fn test_quoted_printable_escapes_and_soft_breaks() {
        let decoded = decode_quoted_printable(b"caf=E9 au=\r\nlait=\nnoir");
        assert_eq!(decoded, b"caf\xe9 aulaitnoir");
    }

    #[test]
    fn test_quoted_printable_trailing_equals() {
        assert_eq!(decode_quoted_printable(b"end=\n"), b"end");
        assert_eq!(decode_quoted_printable(b"end=\r\n"), b"end");
        assert_eq!(decode_quoted_printable(b"x=4"), b"x=4");
    }

    #[test]
    fn test_quoted_printable_keeps_malformed() {
        assert_eq!(decode_quoted_printable(b"a=ZZb="), b"a=ZZb=");
    }

    #[test]
    fn test_q_encoding() {
        assert_eq!(decode_q_encoding("caf=E9_noir"), b"caf\xe9 noir");
    }
}
