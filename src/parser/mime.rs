//! MIME tree adapter: turns `mail-parser` output into a [`MimeNode`] tree.
//!
//! The rest of the crate never touches `mail_parser` types directly; it walks
//! the tagged tree produced here. Every node (containers included) receives
//! an index in depth-first pre-order, so leaf indices are increasing but not
//! contiguous.

use mail_parser::{
    ContentType, Encoding, Message, MessageParser, MessagePart, MimeHeaders, PartType,
};

use super::transfer::{decode_base64, decode_quoted_printable};

/// Nesting limit for multipart / embedded message descent (adversarial input).
const MAX_DEPTH: usize = 32;

/// One node of a decoded MIME tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MimeNode {
    /// Position in pre-order traversal, starting at 0 for the root.
    pub index: usize,
    /// Lowercase `type/subtype`.
    pub mime_type: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf(Leaf),
    Multipart(Vec<MimeNode>),
    /// An embedded `message/*`; `None` when its body could not be parsed.
    Message(Option<Box<MimeNode>>),
}

/// Payload and metadata of a single-part node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Leaf {
    /// Transfer-decoded bytes, still in `charset`.
    pub data: Vec<u8>,
    /// Lowercase charset parameter, empty when absent.
    pub charset: String,
    pub filename: Option<String>,
    pub content_id: Option<String>,
}

/// Decode a complete message into a tree. `None` if nothing could be parsed.
pub fn decode_tree(raw: &[u8]) -> Option<MimeNode> {
    let message = MessageParser::default().parse(raw)?;
    let mut next_index = 0;
    build_message(&message, raw, &mut next_index, 0)
}

/// `raw` is the buffer the part offsets of `message` point into.
fn build_message(
    message: &Message<'_>,
    raw: &[u8],
    next_index: &mut usize,
    depth: usize,
) -> Option<MimeNode> {
    let root = message.parts.first()?;
    Some(build_node(message, raw, root, next_index, depth))
}

fn build_node(
    message: &Message<'_>,
    raw: &[u8],
    part: &MessagePart<'_>,
    next_index: &mut usize,
    depth: usize,
) -> MimeNode {
    let index = *next_index;
    *next_index += 1;
    let mime_type = resolve_mime_type(part.content_type(), &part.body);

    let kind = match &part.body {
        PartType::Multipart(children) => {
            let mut nodes = Vec::with_capacity(children.len());
            if depth < MAX_DEPTH {
                for &child_id in children {
                    if let Some(child) = message.parts.get(child_id) {
                        nodes.push(build_node(message, raw, child, next_index, depth + 1));
                    }
                }
            } else {
                tracing::warn!(depth, "MIME nesting too deep, children skipped");
            }
            NodeKind::Multipart(nodes)
        }
        PartType::Message(inner) => {
            let inner = if depth < MAX_DEPTH {
                let inner_raw = offset_base(raw, inner.raw_message());
                build_message(inner, inner_raw, next_index, depth + 1).map(Box::new)
            } else {
                None
            };
            NodeKind::Message(inner)
        }
        _ => NodeKind::Leaf(build_leaf(raw, part)),
    };

    MimeNode {
        index,
        mime_type,
        kind,
    }
}

fn build_leaf(raw: &[u8], part: &MessagePart<'_>) -> Leaf {
    let declared = part
        .content_type()
        .and_then(|ct| ct.attribute("charset"))
        .map(|c| c.trim().to_lowercase())
        .unwrap_or_default();

    // mail-parser hands text back already converted to UTF-8; the untouched
    // bytes are recovered from the raw message so the declared charset
    // still describes the payload.
    let (data, charset) = match &part.body {
        PartType::Text(text) | PartType::Html(text) => {
            match transfer_decoded_body(raw, part) {
                Some(bytes) => (bytes, declared),
                None => (text.as_bytes().to_vec(), "utf-8".to_string()),
            }
        }
        _ => (part.contents().to_vec(), declared),
    };

    Leaf {
        data,
        charset,
        filename: part.attachment_name().map(str::to_string),
        content_id: part
            .content_id()
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string()),
    }
}

/// Offsets of an embedded message that was parsed in place are positions in
/// the enclosing buffer; one that had to be decoded first (e.g. a base64
/// `message/rfc822`) owns its bytes and is indexed from zero.
fn offset_base<'a>(outer: &'a [u8], inner: &'a [u8]) -> &'a [u8] {
    let range = outer.as_ptr_range();
    if range.contains(&inner.as_ptr()) {
        outer
    } else {
        inner
    }
}

fn transfer_decoded_body(raw: &[u8], part: &MessagePart<'_>) -> Option<Vec<u8>> {
    let body = raw.get(part.offset_body..part.offset_end)?;
    match part.encoding {
        Encoding::Base64 => decode_base64(body),
        Encoding::QuotedPrintable => Some(decode_quoted_printable(body)),
        _ => Some(body.to_vec()),
    }
}

/// Lowercase `type/subtype` for a node.
///
/// Known discrete and composite types get their canonical name and any other
/// well-formed token (`font`, `x-custom`) passes through; a malformed one
/// becomes `application`. Without a usable Content-Type the type is inferred
/// from what the decoder produced.
fn resolve_mime_type(content_type: Option<&ContentType<'_>>, body: &PartType<'_>) -> String {
    match content_type.and_then(|ct| ct.subtype().map(|sub| (ct.ctype(), sub))) {
        Some((main, sub)) => {
            let main = classify_media_type(main).unwrap_or("application");
            format!("{main}/{sub}").to_lowercase()
        }
        None => inferred_mime_type(body).to_string(),
    }
}

/// Map a top-level media type to its canonical name; `None` when it is not a
/// valid MIME token.
pub fn classify_media_type(main: &str) -> Option<&str> {
    let main = main.trim();
    const KNOWN: [&str; 7] = [
        "text",
        "image",
        "audio",
        "video",
        "application",
        "message",
        "multipart",
    ];
    if let Some(known) = KNOWN.iter().find(|k| k.eq_ignore_ascii_case(main)) {
        return Some(*known);
    }
    let is_token = !main.is_empty() && main.bytes().all(is_token_byte);
    is_token.then_some(main)
}

/// RFC 2045 token: printable ASCII minus space and tspecials.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
}

fn inferred_mime_type(body: &PartType<'_>) -> &'static str {
    match body {
        PartType::Text(_) => "text/plain",
        PartType::Html(_) => "text/html",
        PartType::Message(_) => "message/rfc822",
        PartType::Multipart(_) => "multipart/mixed",
        _ => "application/octet-stream",
    }
}

impl MimeNode {
    /// Visit every leaf in traversal order.
    pub fn for_each_leaf<'a>(&'a self, visit: &mut impl FnMut(&'a MimeNode, &'a Leaf)) {
        match &self.kind {
            NodeKind::Leaf(leaf) => visit(self, leaf),
            NodeKind::Multipart(children) => {
                for child in children {
                    child.for_each_leaf(visit);
                }
            }
            NodeKind::Message(Some(inner)) => inner.for_each_leaf(visit),
            NodeKind::Message(None) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(node: &MimeNode) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        node.for_each_leaf(&mut |n, _| out.push((n.index, n.mime_type.clone())));
        out
    }

    #[test]
    fn test_single_part_is_one_leaf() {
        let raw = b"Subject: x\r\nContent-Type: text/plain; charset=us-ascii\r\n\r\nhello";
        let tree = decode_tree(raw).expect("parsed");
        assert_eq!(tree.index, 0);
        assert_eq!(tree.mime_type, "text/plain");
        match &tree.kind {
            NodeKind::Leaf(leaf) => {
                assert_eq!(leaf.data, b"hello");
                assert_eq!(leaf.charset, "us-ascii");
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_multipart_indices_are_preorder() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n\r\n",
            "--inner\r\nContent-Type: text/plain\r\n\r\nplain\r\n",
            "--inner\r\nContent-Type: text/html\r\n\r\n<p>html</p>\r\n",
            "--inner--\r\n",
            "--outer\r\nContent-Type: image/PNG\r\nContent-Transfer-Encoding: base64\r\n\r\naGk=\r\n",
            "--outer--\r\n",
        );
        let tree = decode_tree(raw.as_bytes()).expect("parsed");
        assert_eq!(tree.mime_type, "multipart/mixed");
        assert_eq!(
            leaves(&tree),
            vec![
                (2, "text/plain".to_string()),
                (3, "text/html".to_string()),
                (4, "image/png".to_string()),
            ]
        );
    }

    #[test]
    fn test_embedded_message_is_descended() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\nouter\r\n",
            "--b\r\nContent-Type: message/rfc822\r\n\r\n",
            "Subject: inner\r\nContent-Type: text/html\r\n\r\n<b>inner</b>\r\n",
            "--b--\r\n",
        );
        let tree = decode_tree(raw.as_bytes()).expect("parsed");
        let found = leaves(&tree);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, "text/plain");
        assert_eq!(found[1].1, "text/html");
        assert!(found[1].0 > found[0].0);
    }

    #[test]
    fn test_classify_media_type() {
        assert_eq!(classify_media_type("TEXT"), Some("text"));
        assert_eq!(classify_media_type("x-custom"), Some("x-custom"));
        assert_eq!(classify_media_type("font"), Some("font"));
        assert_eq!(classify_media_type("x-"), Some("x-"));
        assert_eq!(classify_media_type(""), None);
        assert_eq!(classify_media_type("bad type"), None);
        assert_eq!(classify_media_type("a/b"), None);
    }

    #[test]
    fn test_unregistered_media_type_is_kept() {
        let raw = b"Content-Type: font/WOFF\r\nContent-Transfer-Encoding: base64\r\n\r\naGk=";
        let tree = decode_tree(raw).expect("parsed");
        assert_eq!(tree.mime_type, "font/woff");
    }

    #[test]
    fn test_embedded_leaf_bytes_come_from_its_own_range() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n",
            "--b\r\nContent-Type: message/rfc822\r\n\r\n",
            "Subject: inner\r\nContent-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: base64\r\n\r\nY2Fm6Q==\r\n",
            "--b--\r\n",
        );
        let tree = decode_tree(raw.as_bytes()).expect("parsed");
        let mut found = Vec::new();
        tree.for_each_leaf(&mut |_, leaf| found.push((leaf.data.clone(), leaf.charset.clone())));
        assert_eq!(found, vec![(b"caf\xe9".to_vec(), "iso-8859-1".to_string())]);
    }
}
