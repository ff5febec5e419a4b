//! HTML rendering of report cards for the browser UI.
//!
//! Output is a fragment (no `<html>` wrapper) meant to be dropped into a
//! report card container. All text is escaped.

use super::markdown::{parse_blocks, Block};

/// Render report markdown as an HTML fragment.
pub fn render_html(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len() * 2);
    let mut open_list: Option<&'static str> = None;

    for block in parse_blocks(markdown) {
        let list_kind = match &block {
            Block::ListItem { marker, .. } if marker == "•" => Some("ul"),
            Block::ListItem { .. } => Some("ol"),
            _ => None,
        };
        if open_list.is_some() && open_list != list_kind {
            if let Some(tag) = open_list.take() {
                out.push_str(&format!("</{tag}>\n"));
            }
        }
        if let (Some(tag), None) = (list_kind, open_list) {
            out.push_str(&format!("<{tag}>\n"));
            open_list = Some(tag);
        }

        match block {
            Block::Heading { level, text } => {
                let level = level.clamp(1, 6);
                out.push_str(&format!("<h{level}>{}</h{level}>\n", escape(&text)));
            }
            Block::Table { header, rows } => {
                out.push_str("<table>\n<thead><tr>");
                for cell in &header {
                    out.push_str(&format!("<th>{}</th>", escape(cell)));
                }
                out.push_str("</tr></thead>\n<tbody>\n");
                for row in &rows {
                    out.push_str("<tr>");
                    for c in 0..header.len().max(row.len()) {
                        let cell = row.get(c).map(String::as_str).unwrap_or("");
                        out.push_str(&format!("<td>{}</td>", escape(cell)));
                    }
                    out.push_str("</tr>\n");
                }
                out.push_str("</tbody>\n</table>\n");
            }
            Block::ListItem { text, .. } => {
                out.push_str(&format!("<li>{}</li>\n", escape(&text)));
            }
            Block::Paragraph(text) => out.push_str(&format!("<p>{}</p>\n", escape(&text))),
            Block::Rule => out.push_str("<hr>\n"),
        }
    }

    if let Some(tag) = open_list {
        out.push_str(&format!("</{tag}>\n"));
    }
    out
}

/// Escape `& < > " '` for HTML text and attribute contexts.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
