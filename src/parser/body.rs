//! Message body extraction: part index, plain-text view and rendered HTML view.
//!
//! A [`Body`] is created from raw message bytes and parses itself lazily the
//! first time any view is asked for. Parsing never fails: a message that
//! cannot be decoded simply has no parts and empty views.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::charset;
use super::mime;
use super::render::{self, BuiltinRenderer, HtmlRenderer};

/// One decoded MIME leaf.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Part {
    /// Transfer-decoded payload in the declared charset.
    pub data: Vec<u8>,
    /// Lowercase charset parameter, empty when absent.
    pub charset: String,
    /// Lowercase `type/subtype`.
    pub mime_type: String,
    pub filename: Option<String>,
    pub content_id: Option<String>,
}

/// Everything derived from the raw bytes in one parse.
#[derive(Debug, Clone, Default)]
struct Parsed {
    parts: BTreeMap<usize, Part>,
    text_plain: String,
    text_html: String,
    unknown_charset: bool,
}

/// A message body and its lazily computed views.
#[derive(Clone)]
pub struct Body {
    data: Vec<u8>,
    renderer: Arc<dyn HtmlRenderer>,
    parsed: OnceCell<Parsed>,
}

impl Body {
    /// Body over `data`, rendering HTML with `renderer`.
    pub fn new(data: impl Into<Vec<u8>>, renderer: Arc<dyn HtmlRenderer>) -> Self {
        let mut body = Self {
            data: Vec::new(),
            renderer,
            parsed: OnceCell::new(),
        };
        body.set_data(data);
        body
    }

    /// Body rendering HTML in-process.
    pub fn with_builtin_renderer(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, Arc::new(BuiltinRenderer))
    }

    /// Replace the raw message. A leading mbox `From ` line is dropped and
    /// any earlier parse is discarded.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        let mut data = data.into();
        strip_mbox_from_line(&mut data);
        self.data = data;
        self.parsed = OnceCell::new();
    }

    /// The stored message bytes (after `From ` line removal).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Plain-text view, falling back to the rendered HTML.
    pub fn text_plain(&self) -> &str {
        let parsed = self.parse();
        if parsed.text_plain.is_empty() {
            &parsed.text_html
        } else {
            &parsed.text_plain
        }
    }

    /// Rendered HTML view, falling back to the plain text.
    pub fn text_html(&self) -> &str {
        let parsed = self.parse();
        if parsed.text_html.is_empty() {
            &parsed.text_plain
        } else {
            &parsed.text_html
        }
    }

    /// All leaves by traversal index.
    pub fn parts(&self) -> &BTreeMap<usize, Part> {
        &self.parse().parts
    }

    /// Leaves carrying a file name, i.e. what a reader would call attachments.
    pub fn attachments(&self) -> impl Iterator<Item = (usize, &Part)> {
        self.parts()
            .iter()
            .filter(|(_, part)| part.filename.is_some())
            .map(|(&index, part)| (index, part))
    }

    /// `true` when a displayed part declared a charset that could not be
    /// converted; its bytes were shown as they are.
    pub fn has_unknown_charset(&self) -> bool {
        self.parse().unknown_charset
    }

    fn parse(&self) -> &Parsed {
        self.parsed.get_or_init(|| self.parse_now())
    }

    fn parse_now(&self) -> Parsed {
        let mut parsed = Parsed::default();
        let mut plain_index = None;
        let mut html_index = None;

        match mime::decode_tree(&self.data) {
            Some(tree) => tree.for_each_leaf(&mut |node, leaf| {
                if plain_index.is_none() && node.mime_type == "text/plain" {
                    plain_index = Some(node.index);
                }
                if html_index.is_none() && node.mime_type == "text/html" {
                    html_index = Some(node.index);
                }
                parsed.parts.insert(
                    node.index,
                    Part {
                        data: leaf.data.clone(),
                        charset: leaf.charset.clone(),
                        mime_type: node.mime_type.clone(),
                        filename: leaf.filename.clone(),
                        content_id: leaf.content_id.clone(),
                    },
                );
            }),
            None => warn!(len = self.data.len(), "Message could not be decoded"),
        }

        if let Some(part) = plain_index.and_then(|i| parsed.parts.get(&i)) {
            let (text, unknown) = part_text(part);
            parsed.text_plain = text;
            parsed.unknown_charset |= unknown;
        }

        if let Some(part) = html_index.and_then(|i| parsed.parts.get(&i)) {
            let (html, unknown) = part_text(part);
            parsed.unknown_charset |= unknown;
            let html = render::neutralize_meta_tags(&html);
            match self.renderer.render(&html) {
                Ok(text) => parsed.text_html = text,
                Err(e) => warn!(error = %e, "HTML rendering failed"),
            }
        }

        debug!(
            parts = parsed.parts.len(),
            plain = ?plain_index,
            html = ?html_index,
            "Parsed message body"
        );
        parsed
    }
}

/// Payload of a text part as UTF-8, plus whether its charset was unknown.
///
/// Unknown charsets pass the bytes through (lossy only where they are not
/// valid UTF-8).
fn part_text(part: &Part) -> (String, bool) {
    if charset::is_utf8(&part.charset) {
        return (String::from_utf8_lossy(&part.data).into_owned(), false);
    }
    match charset::decode_to_utf8(&part.data, &part.charset) {
        Ok(text) => (text, false),
        Err(e) => {
            warn!(charset = %part.charset, error = %e, "Showing part undecoded");
            (String::from_utf8_lossy(&part.data).into_owned(), true)
        }
    }
}

/// Drop a leading mbox separator line (`From sender date\n`).
fn strip_mbox_from_line(data: &mut Vec<u8>) {
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            data.drain(..=pos);
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("len", &self.data.len())
            .field("renderer", &self.renderer)
            .field("parsed", &self.parsed.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MailError, Result};

    /// Renderer that tags its input so tests can see it was used.
    #[derive(Debug)]
    struct Bracketing;

    impl HtmlRenderer for Bracketing {
        fn render(&self, html: &str) -> Result<String> {
            Ok(format!("[{html}]"))
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl HtmlRenderer for Failing {
        fn render(&self, _html: &str) -> Result<String> {
            Err(MailError::Render("boom".into()))
        }
    }

    #[test]
    fn test_from_line_is_stripped() {
        let body = Body::with_builtin_renderer(&b"From sender Mon Jan 1\nSubject: x\n\nhi"[..]);
        assert!(body.data().starts_with(b"Subject: x\n"));
    }

    #[test]
    fn test_from_line_without_newline_is_kept() {
        let body = Body::with_builtin_renderer(&b"From nobody"[..]);
        assert_eq!(body.data(), b"From nobody");
    }

    #[test]
    fn test_from_header_is_not_a_separator() {
        let raw = b"From: alice@example.com\nSubject: x\n\nhi";
        let body = Body::with_builtin_renderer(&raw[..]);
        assert_eq!(body.data(), raw);
    }

    #[test]
    fn test_only_first_from_line_is_stripped() {
        let body = Body::with_builtin_renderer(&b"From a\nFrom b\nSubject: x\n\nhi"[..]);
        assert!(body.data().starts_with(b"From b\n"));
    }

    #[test]
    fn test_html_goes_through_renderer_with_meta_neutralized() {
        let raw = "Content-Type: text/html; charset=utf-8\r\n\r\n<META charset=\"koi8-r\">hi";
        let body = Body::new(raw, Arc::new(Bracketing));
        assert_eq!(body.text_html(), "[<BETA charset=\"koi8-r\">hi]");
        assert_eq!(body.text_plain(), body.text_html());
    }

    #[test]
    fn test_render_failure_falls_back_to_plain() {
        let raw = concat!(
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\nplain words\r\n",
            "--b\r\nContent-Type: text/html\r\n\r\n<p>html words</p>\r\n",
            "--b--\r\n",
        );
        let body = Body::new(raw, Arc::new(Failing));
        assert!(body.text_plain().starts_with("plain words"));
        assert_eq!(body.text_html(), body.text_plain());
    }

    #[test]
    fn test_set_data_resets_views() {
        let mut body = Body::with_builtin_renderer("Content-Type: text/plain\r\n\r\nfirst");
        assert_eq!(body.text_plain(), "first");
        body.set_data("Content-Type: text/plain\r\n\r\nsecond");
        assert_eq!(body.text_plain(), "second");
    }

    #[test]
    fn test_debug_does_not_dump_payload() {
        let body = Body::with_builtin_renderer("Content-Type: text/plain\r\n\r\nsecret");
        assert!(!format!("{body:?}").contains("secret"));
    }
}
