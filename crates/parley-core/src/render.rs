//! Markdown render boundary.
//!
//! A pure function seam: markdown in, an HTML body plus a plain-text
//! rendering out.  Implementations must not perform network or disk I/O
//! and must not let embedded scripts through.

use pulldown_cmark::{html, Event, Options, Parser, TagEnd};

/// The two renderings produced from one markdown source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub html: String,
    pub plain_text: String,
}

/// Pure markdown conversion boundary.
pub trait MarkdownRenderer: Send + Sync {
    fn render_markdown(&self, markdown: &str) -> RenderedContent;
}

/// Default CommonMark implementation.
///
/// Raw HTML in the source is demoted to literal text instead of being
/// passed through, so `<script>` and friends never reach the rendered
/// output.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommonMarkRenderer;

impl MarkdownRenderer for CommonMarkRenderer {
    fn render_markdown(&self, markdown: &str) -> RenderedContent {
        let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
        let events: Vec<Event> = Parser::new_ext(markdown, options)
            .map(|event| match event {
                Event::Html(raw) => Event::Text(raw),
                Event::InlineHtml(raw) => Event::Text(raw),
                other => other,
            })
            .collect();

        let mut html_out = String::new();
        html::push_html(&mut html_out, events.iter().cloned());

        RenderedContent {
            html: html_out.trim_end().to_string(),
            plain_text: plain_text_from_events(&events),
        }
    }
}

fn plain_text_from_events(events: &[Event]) -> String {
    let mut out = String::new();
    for event in events {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(text),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Reduce an HTML body to plain text: tags stripped, block boundaries
/// turned into newlines, character entities decoded.
pub fn html_to_plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut tag = None::<String>;

    for c in html.chars() {
        match (&mut tag, c) {
            (None, '<') => tag = Some(String::new()),
            (Some(name), '>') => {
                if is_block_boundary(name) {
                    out.push('\n');
                }
                tag = None;
            }
            (Some(name), c) => name.push(c),
            (None, c) => out.push(c),
        }
    }

    decode_entities(&out).trim().to_string()
}

fn is_block_boundary(tag: &str) -> bool {
    let closing = tag.starts_with('/');
    let name = tag
        .trim_start_matches('/')
        .split([' ', '/'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match name.as_str() {
        "br" => true,
        "p" | "div" | "li" | "tr" => closing,
        _ => false,
    }
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let Some(end) = rest.find(';').filter(|&e| e <= 10) else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..end];
        match decode_entity(entity) {
            Some(decoded) => out.push(decoded),
            None => out.push_str(&rest[..=end]),
        }
        rest = &rest[end + 1..];
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok()?
            } else {
                return None;
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_markdown_renders_strong() {
        let rendered = CommonMarkRenderer.render_markdown("**hi**");

        assert!(rendered.html.contains("<strong>hi</strong>"));
        assert_eq!(rendered.plain_text, "hi");
    }

    #[test]
    fn multi_paragraph_plain_text_keeps_boundaries() {
        let rendered = CommonMarkRenderer.render_markdown("one\n\ntwo *three*");

        assert_eq!(rendered.plain_text, "one\ntwo three");
        assert!(rendered.html.contains("<em>three</em>"));
    }

    #[test]
    fn raw_html_is_not_passed_through() {
        let rendered = CommonMarkRenderer.render_markdown("hi <script>alert(1)</script>");

        assert!(!rendered.html.contains("<script>"));
    }

    #[test]
    fn inline_code_survives_in_plain_text() {
        let rendered = CommonMarkRenderer.render_markdown("run `cargo doc` now");

        assert_eq!(rendered.plain_text, "run cargo doc now");
    }

    #[test]
    fn html_tag_stripping() {
        assert_eq!(
            html_to_plain_text("<p><strong>hi</strong> there</p>"),
            "hi there"
        );
        assert_eq!(html_to_plain_text("a<br>b"), "a\nb");
        assert_eq!(html_to_plain_text("<p>one</p><p>two</p>"), "one\ntwo");
    }

    #[test]
    fn html_entity_decoding() {
        assert_eq!(
            html_to_plain_text("fish &amp; chips &lt;hot&gt;"),
            "fish & chips <hot>"
        );
        assert_eq!(html_to_plain_text("caf&#233; &#x41;"), "café A");
        assert_eq!(html_to_plain_text("broken &doesnotexist; stays"), "broken &doesnotexist; stays");
    }
}
