//! HTML-to-text rendering for terminal display.
//!
//! [`CommandRenderer`] shells out to a converter such as `lynx -dump` through
//! scoped temporary files; [`BuiltinRenderer`] does a simpler in-process
//! conversion. Both sit behind [`HtmlRenderer`] so the body extractor does not
//! care which one is configured.

use std::fmt;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::RenderConfig;
use crate::error::{MailError, Result};

/// Converts an HTML document (already UTF-8) into plain text.
pub trait HtmlRenderer: Send + Sync + fmt::Debug {
    fn render(&self, html: &str) -> Result<String>;
}

/// Build the renderer selected by `config`.
pub fn renderer_from_config(config: &RenderConfig) -> Arc<dyn HtmlRenderer> {
    if config.builtin {
        return Arc::new(BuiltinRenderer);
    }
    match CommandRenderer::from_command_line(&config.html_to_text_cmd, config.reduce_indent) {
        Some(renderer) => Arc::new(renderer),
        None => {
            tracing::warn!("Empty html_to_text_cmd, using builtin renderer");
            Arc::new(BuiltinRenderer)
        }
    }
}

// ── External command ────────────────────────────────────────────

/// Runs `program args… <input.html>` and takes its standard output.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    reduce_indent: usize,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>, reduce_indent: usize) -> Self {
        Self {
            program: program.into(),
            args,
            reduce_indent,
        }
    }

    /// Split a whitespace-separated command line. `None` if it is empty.
    pub fn from_command_line(command: &str, reduce_indent: usize) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self::new(program, words.collect(), reduce_indent))
    }
}

impl HtmlRenderer for CommandRenderer {
    fn render(&self, html: &str) -> Result<String> {
        // Both files are removed when the handles drop, on every path out.
        let mut input = temp_file(".html")?;
        input
            .write_all(html.as_bytes())
            .and_then(|()| input.flush())
            .map_err(|e| MailError::io(input.path(), e))?;

        let output = temp_file(".txt")?;
        let stdout = output
            .reopen()
            .map_err(|e| MailError::io(output.path(), e))?;

        debug!(program = %self.program, input = %input.path().display(), "Rendering html");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(input.path())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::null())
            .status()
            .map_err(|e| MailError::Render(format!("{}: {e}", self.program)))?;

        if !status.success() {
            return Err(MailError::Render(format!("{} exited with {status}", self.program)));
        }

        let mut bytes = Vec::new();
        output
            .reopen()
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| MailError::io(output.path(), e))?;

        let text = String::from_utf8_lossy(&bytes);
        Ok(reduce_indent(&text, self.reduce_indent))
    }
}

fn temp_file(suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("mailshell-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| MailError::io(std::env::temp_dir(), e))
}

/// Remove up to `columns` leading spaces from every line.
pub fn reduce_indent(text: &str, columns: usize) -> String {
    if columns == 0 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let spaces = line.bytes().take(columns).take_while(|&b| b == b' ').count();
        out.push_str(&line[spaces..]);
    }
    out
}

/// Rewrite `<meta` tag openings to `<beta` (case preserved) so a converter
/// does not act on embedded charset or refresh directives.
pub fn neutralize_meta_tags(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(rel) = html[search..].find('<') {
        let start = search + rel;
        let name = bytes.get(start + 1..start + 5);
        let after = bytes.get(start + 5).copied();
        let is_meta = name.is_some_and(|n| n.eq_ignore_ascii_case(b"meta"))
            && after.map_or(true, |b| b.is_ascii_whitespace() || b == b'>' || b == b'/');
        if is_meta {
            out.push_str(&html[copied..start + 1]);
            out.push(if bytes[start + 1] == b'M' { 'B' } else { 'b' });
            copied = start + 2;
        }
        search = start + 1;
    }
    out.push_str(&html[copied..]);
    out
}

// ── In-process ──────────────────────────────────────────────────

/// Tag-stripping converter with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl HtmlRenderer for BuiltinRenderer {
    fn render(&self, html: &str) -> Result<String> {
        Ok(html_to_text(html))
    }
}

/// Convert HTML to plain text for terminal display.
///
/// - Preserves line breaks from `<br>`, `<p>`, `<div>` and friends
/// - Converts `<li>` to `"- item"`
/// - Removes scripts and styles
/// - Decodes common HTML entities
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");
    text = remove_tag_block(&text, "head");

    let mut result = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(open) = rest.find('<') {
        result.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            rest = "";
            break;
        };
        let tag = &rest[open + 1..open + close];
        match tag_name(tag).as_str() {
            "br" | "p" | "div" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table"
            | "ul" | "ol" | "blockquote" => result.push('\n'),
            "li" if !tag.starts_with('/') => result.push_str("\n- "),
            _ => {}
        }
        rest = &rest[open + close + 1..];
    }
    result.push_str(rest);

    let result = decode_entities(&result);

    // Collapse multiple blank lines into at most one
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(result.len());
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Lowercase element name of a tag body such as `/P class="x"`.
fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_ascii_whitespace() || c == '/')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Remove an entire tag block (e.g. `<script>…</script>`), case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut result = String::with_capacity(html.len());
    let mut pos = 0;
    let mut search = 0;
    while let Some(rel) = lower[search..].find(&open) {
        let start = search + rel;
        search = start + open.len();
        // "<head" must not match "<header"
        let boundary = lower.as_bytes().get(search).copied();
        if !boundary.map_or(true, |b| b == b'>' || b == b'/' || b.is_ascii_whitespace()) {
            continue;
        }
        result.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => {
                pos = start + end + close.len();
                search = pos;
            }
            None => {
                pos = html.len();
                break;
            }
        }
    }
    result.push_str(&html[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_basic() {
        let text = html_to_text("<p>Hello <b>world</b></p><p>Second paragraph</p>");
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(html_to_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_html_to_text_removes_scripts_and_head() {
        let html = "<HEAD><title>t</title></HEAD>Before<Script>alert('x')</SCRIPT>After";
        assert_eq!(html_to_text(html), "BeforeAfter");
    }

    #[test]
    fn test_html_to_text_keeps_header_element() {
        assert_eq!(html_to_text("<header>Top</header><p>Body</p>"), "Top\nBody");
    }

    #[test]
    fn test_html_to_text_lists() {
        let text = html_to_text("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(text, "- one\n- two");
    }

    #[test]
    fn test_neutralize_meta_tags() {
        let html = r#"<META http-equiv="refresh"><meta charset="x"/><Meta>x<metadata>"#;
        assert_eq!(
            neutralize_meta_tags(html),
            r#"<BETA http-equiv="refresh"><beta charset="x"/><Beta>x<metadata>"#
        );
    }

    #[test]
    fn test_neutralize_meta_without_tags() {
        assert_eq!(neutralize_meta_tags("plain < text"), "plain < text");
    }

    #[test]
    fn test_reduce_indent() {
        let text = "   three\n     five\n one\nnone\n";
        assert_eq!(reduce_indent(text, 3), "three\n  five\none\nnone\n");
        assert_eq!(reduce_indent(text, 0), text);
    }

    #[test]
    fn test_command_line_split() {
        assert!(CommandRenderer::from_command_line("   ", 3).is_none());
        let renderer = CommandRenderer::from_command_line("lynx -dump", 3).expect("some");
        assert_eq!(renderer.program, "lynx");
        assert_eq!(renderer.args, vec!["-dump".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_captures_stdout() {
        let renderer = CommandRenderer::new("cat", Vec::new(), 3);
        let text = renderer.render("   <p>hi</p>\n").expect("cat succeeds");
        assert_eq!(text, "<p>hi</p>\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_nonzero_exit() {
        let renderer = CommandRenderer::new("false", Vec::new(), 3);
        assert!(matches!(renderer.render("x"), Err(MailError::Render(_))));
    }

    #[test]
    fn test_command_renderer_missing_program() {
        let renderer = CommandRenderer::new("mailshell-no-such-converter", Vec::new(), 3);
        assert!(matches!(renderer.render("x"), Err(MailError::Render(_))));
    }

    #[test]
    fn test_renderer_from_config() {
        let mut config = RenderConfig::default();
        config.builtin = true;
        let renderer = renderer_from_config(&config);
        assert_eq!(renderer.render("<p>a</p>").unwrap(), "a");
    }
}
