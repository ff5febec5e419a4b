//! Block-level reading of report-card markdown.
//!
//! Report cards use a small subset of markdown: headings, one or two pipe
//! tables, bullet lists, bold labels and plain paragraphs. This parser
//! covers exactly that subset and turns it into [`Block`]s, which the PDF
//! and HTML renderers lay out. Anything it does not recognise becomes a
//! paragraph, so no model output is ever dropped.

use crate::pipeline::postprocess::{is_heading, is_separator_row, is_table_row};
use once_cell::sync::Lazy;
use regex::Regex;

/// One block of a report card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Table { header: Vec<String>, rows: Vec<Vec<String>> },
    /// `marker` is `•` for bullets or the original `1.` style number.
    ListItem { marker: String, text: String },
    Paragraph(String),
    Rule,
}

static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}[.)])\s+(.*)$").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static RE_EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\*\*|__)(.+?)(\*\*|__)|\*([^*\s][^*]*)\*|`([^`]*)`").unwrap());

/// Parse report markdown into blocks, in document order.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut blocks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut i = 0;

    let flush = |paragraph: &mut Vec<String>, blocks: &mut Vec<Block>| {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(paragraph.join(" ")));
            paragraph.clear();
        }
    };

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            i += 1;
            continue;
        }

        if is_heading(trimmed) {
            flush(&mut paragraph, &mut blocks);
            let level = trimmed.chars().take_while(|&c| c == '#').count();
            let text = plain_text(trimmed[level..].trim().trim_end_matches('#').trim());
            blocks.push(Block::Heading {
                level: level as u8,
                text,
            });
            i += 1;
            continue;
        }

        if is_rule(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Rule);
            i += 1;
            continue;
        }

        if is_table_row(trimmed) {
            flush(&mut paragraph, &mut blocks);
            let mut rows: Vec<Vec<String>> = Vec::new();
            while i < lines.len() && is_table_row(lines[i]) {
                if !is_separator_row(lines[i]) {
                    rows.push(split_row(lines[i]));
                }
                i += 1;
            }
            if !rows.is_empty() {
                let header = rows.remove(0);
                blocks.push(Block::Table { header, rows });
            }
            continue;
        }

        if let Some(item) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("+ "))
        {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::ListItem {
                marker: "•".to_string(),
                text: plain_text(item.trim()),
            });
            i += 1;
            continue;
        }

        if let Some(caps) = RE_ORDERED.captures(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::ListItem {
                marker: caps[1].to_string(),
                text: plain_text(caps[2].trim()),
            });
            i += 1;
            continue;
        }

        paragraph.push(plain_text(trimmed));
        i += 1;
    }

    flush(&mut paragraph, &mut blocks);
    blocks
}

/// `---`, `***` or `___` (three or more, spaces allowed).
fn is_rule(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact.len() >= 3
        && (compact.chars().all(|c| c == '-')
            || compact.chars().all(|c| c == '*')
            || compact.chars().all(|c| c == '_'))
}

/// Split a pipe-table row into trimmed cells.
///
/// Only the border pipes are removed; interior empty cells (an empty
/// Comments column, say) are kept so columns stay aligned.
pub fn split_row(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|').map(|c| plain_text(c.trim())).collect()
}

/// Strip inline markdown (`**bold**`, `*italic*`, `` `code` ``, links)
/// down to the visible text.
pub fn plain_text(inline: &str) -> String {
    let s = RE_LINK.replace_all(inline, "$1");
    RE_EMPHASIS
        .replace_all(&s, |caps: &regex::Captures<'_>| {
            caps.get(2)
                .or_else(|| caps.get(4))
                .or_else(|| caps.get(5))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}
