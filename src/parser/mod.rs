//! Message decoding: headers, MIME tree, transfer and charset decoding, and
//! the body extractor built on top of them.

pub mod body;
pub mod charset;
pub mod header;
pub mod mime;
pub mod render;
pub mod transfer;

pub use body::{Body, Part};
