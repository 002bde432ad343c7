//! Markdown → Telegram HTML conversion and long-message splitting.
//!
//! Telegram's HTML parse mode accepts a small tag set; this walks the
//! Markdown event stream and emits only what Telegram understands:
//! headings become bold lines, lists become bullets, everything else maps
//! to `<b>/<i>/<s>/<code>/<pre>/<a>`.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Escape text for Telegram HTML.
pub fn html_escape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for c in content.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Convert light Markdown to Telegram HTML.
pub fn markdown_to_html(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(content, options);
    let mut out = String::with_capacity(content.len());
    let mut list_index: Option<u64> = None;

    for event in parser {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { .. } | Tag::Strong => out.push_str("<b>"),
                Tag::Emphasis => out.push_str("<i>"),
                Tag::Strikethrough => out.push_str("<s>"),
                Tag::CodeBlock(_) => out.push_str("<pre>"),
                Tag::Link { dest_url, .. } => {
                    out.push_str(&format!("<a href=\"{}\">", html_escape(&dest_url)));
                }
                Tag::List(start) => list_index = start,
                Tag::Item => match &mut list_index {
                    Some(n) => {
                        out.push_str(&format!("{}. ", n));
                        *n += 1;
                    }
                    None => out.push_str("• "),
                },
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => out.push_str("</b>\n"),
                TagEnd::Strong => out.push_str("</b>"),
                TagEnd::Emphasis => out.push_str("</i>"),
                TagEnd::Strikethrough => out.push_str("</s>"),
                TagEnd::CodeBlock => out.push_str("</pre>\n"),
                TagEnd::Link => out.push_str("</a>"),
                TagEnd::Paragraph | TagEnd::Item => out.push('\n'),
                TagEnd::List(_) => {
                    list_index = None;
                    out.push('\n');
                }
                _ => {}
            },
            Event::Text(text) => out.push_str(&html_escape(&text)),
            Event::Code(code) => {
                out.push_str("<code>");
                out.push_str(&html_escape(&code));
                out.push_str("</code>");
            }
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

/// Split text into chunks of at most `max_len` bytes, preferring newline
/// then space boundaries, falling back to a hard cut.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() <= max_len {
            parts.push(rest.to_string());
            break;
        }

        // Back up to a char boundary before probing for split points.
        let mut cut = max_len;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &rest[..cut];
        let pos = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&p| p > 0)
            .unwrap_or(cut);

        parts.push(rest[..pos].to_string());
        rest = rest[pos..].trim_start_matches(['\n', ' ']);
    }
    parts
}
