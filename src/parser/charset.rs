//! Character set conversion to UTF-8 via `encoding_rs`.

use encoding_rs::{Encoding, UTF_8};

use crate::error::{MailError, Result};

/// Convert `bytes` declared as `charset` to a UTF-8 string.
///
/// An empty charset, or one resolving to UTF-8, is taken as UTF-8 with
/// invalid sequences replaced. Labels `encoding_rs` does not know yield
/// [`MailError::UnsupportedEncoding`] so the caller can decide how to degrade.
pub fn decode_to_utf8(bytes: &[u8], charset: &str) -> Result<String> {
    let label = charset.trim().trim_matches('"');
    if label.is_empty() {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let encoding = Encoding::for_label(label.as_bytes())
        .or_else(|| alias(label))
        .ok_or_else(|| MailError::UnsupportedEncoding(label.to_string()))?;

    if encoding == UTF_8 {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    let (decoded, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(charset = label, "Malformed input for charset, replaced");
    }
    Ok(decoded.into_owned())
}

/// Whether `charset` names UTF-8 (or nothing at all).
pub fn is_utf8(charset: &str) -> bool {
    let label = charset.trim().trim_matches('"');
    label.is_empty() || Encoding::for_label(label.as_bytes()) == Some(UTF_8)
}

/// Labels seen in real mail that the WHATWG registry does not list.
fn alias(label: &str) -> Option<&'static Encoding> {
    match label.to_ascii_lowercase().as_str() {
        "latin9" | "latin-9" => Some(encoding_rs::ISO_8859_15),
        "cp-1252" => Some(encoding_rs::WINDOWS_1252),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_to_utf8() {
        assert_eq!(decode_to_utf8(b"caf\xe9", "iso-8859-1").unwrap(), "café");
    }

    #[test]
    fn test_windows_1252_quotes() {
        let text = decode_to_utf8(b"\x93hi\x94", "windows-1252").unwrap();
        assert_eq!(text, "\u{201c}hi\u{201d}");
    }

    #[test]
    fn test_koi8r() {
        // "мир"
        assert_eq!(decode_to_utf8(b"\xcd\xc9\xd2", "koi8-r").unwrap(), "мир");
    }

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(decode_to_utf8("añb".as_bytes(), "UTF-8").unwrap(), "añb");
        assert_eq!(decode_to_utf8(b"plain", "").unwrap(), "plain");
        assert_eq!(decode_to_utf8(b"alias", "utf8").unwrap(), "alias");
    }

    #[test]
    fn test_unknown_charset_is_an_error() {
        let err = decode_to_utf8(b"x", "x-no-such-charset").unwrap_err();
        assert!(matches!(err, MailError::UnsupportedEncoding(ref c) if c == "x-no-such-charset"));
    }

    #[test]
    fn test_is_utf8() {
        assert!(is_utf8("utf-8"));
        assert!(is_utf8(""));
        assert!(!is_utf8("iso-8859-1"));
    }
}
