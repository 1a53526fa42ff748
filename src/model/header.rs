//! Decoded message header, as delivered in a [`Response`](super::request::Response).

use chrono::{DateTime, Utc};

use crate::parser::header::{
    decode_encoded_words, decode_header_bytes, extract_angle_bracket, get_header, parse_date,
    split_address_list, unfold_headers,
};

/// Header fields of one message.
///
/// The raw bytes are kept alongside the decoded values so callers can show
/// the full header block or cache it verbatim.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Header {
    #[serde(skip)]
    pub raw: Vec<u8>,
    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: String,
    /// Decoded `From:` value, e.g. `Juan García <juan@ejemplo.com>`.
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    /// `Date:` in UTC; `None` when missing or unparseable.
    pub date: Option<DateTime<Utc>>,
    pub message_id: String,
}

impl Header {
    /// Decode a header block. Anything after the first blank line is ignored,
    /// so a whole message may be passed in.
    pub fn parse(raw: impl Into<Vec<u8>>) -> Self {
        let raw = raw.into();
        let text = decode_header_bytes(&raw);
        let fields = unfold_headers(&text);

        let decoded = |name: &str| {
            get_header(&fields, name)
                .map(decode_encoded_words)
                .unwrap_or_default()
        };
        let addresses = |name: &str| split_address_list(&decoded(name));

        Self {
            subject: decoded("subject"),
            from: decoded("from"),
            to: addresses("to"),
            cc: addresses("cc"),
            date: get_header(&fields, "date").and_then(parse_date),
            message_id: get_header(&fields, "message-id")
                .map(extract_angle_bracket)
                .unwrap_or_default(),
            raw,
        }
    }

    /// Display name of the sender, or its bare address when it has none.
    pub fn sender_name(&self) -> &str {
        let from = self.from.trim();
        match from.rfind('<') {
            Some(angle) => {
                let name = from[..angle].trim().trim_matches('"').trim();
                if name.is_empty() {
                    from[angle + 1..].trim_end_matches('>').trim()
                } else {
                    name
                }
            }
            None => from,
        }
    }
}
