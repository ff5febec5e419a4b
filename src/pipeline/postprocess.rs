//! Post-processing: deterministic cleanup of model-written report cards.
//!
//! The prompts ask for bare markdown in a fixed layout, and models mostly
//! comply. The exceptions are predictable: a ```` ```markdown ```` fence
//! around the whole answer, a "Here is the report card:" preamble, CRLF line
//! endings, a table whose separator row went missing. Each rule below fixes
//! one of these without touching the grading content, and each is a pure
//! `&str → String` function tested on its own.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised (the fence regex
//! expects `\n`), and the preamble is dropped before heading spacing so the
//! report starts on its first heading.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule, in order:
///
/// 1. Strip an outer markdown fence
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Drop a short conversational preamble before the first heading
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Ensure a blank line before every heading
/// 7. Insert a missing GFM separator row under a table header
/// 8. Remove separator rows repeated inside a table body
/// 9. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 10. End with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = drop_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = space_headings(&s);
    let s = insert_missing_separator(&s);
    let s = drop_body_separators(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Lines allowed before the first heading before we stop treating them as
/// chatter and keep everything.
const MAX_PREAMBLE_LINES: usize = 3;

fn drop_preamble(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let first_heading = lines.iter().position(|l| is_heading(l));
    match first_heading {
        Some(idx) if idx > 0 && idx <= MAX_PREAMBLE_LINES => {
            let preamble_is_chatter = lines[..idx]
                .iter()
                .all(|l| !is_table_row(l) && !l.trim_start().starts_with("**"));
            if preamble_is_chatter {
                lines[idx..].join("\n")
            } else {
                input.to_string()
            }
        }
        _ => input.to_string(),
    }
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n\n").into_owned()
}

/// `#`..`######` followed by a space.
pub(crate) fn is_heading(line: &str) -> bool {
    let t = line.trim_start();
    let hashes = t.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && t[hashes..].starts_with(' ')
}

fn space_headings(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 32);
    for (i, line) in input.lines().enumerate() {
        if i > 0 && is_heading(line) {
            let kept = out.trim_end_matches('\n').len();
            out.truncate(kept);
            out.push_str("\n\n");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

pub(crate) fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

pub(crate) fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn insert_missing_separator(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut prev_was_row = false;

    for (i, line) in lines.iter().enumerate() {
        out.push(line.to_string());
        let row = is_table_row(line);
        let header = row && !prev_was_row && !is_separator_row(line);
        if header {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                out.push(format!("|{}", " --- |".repeat(cols)));
            }
        }
        prev_was_row = row;
    }

    out.join("\n")
}

fn drop_body_separators(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut row_index = 0usize;

    for line in input.lines() {
        if is_table_row(line) {
            row_index += 1;
            if is_separator_row(line) && row_index != 2 {
                continue;
            }
        } else {
            row_index = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        assert_eq!(strip_outer_fence("```markdown\n# Report\nok\n```"), "# Report\nok");
        assert_eq!(strip_outer_fence("```\n# Report\n```\n"), "# Report");
        assert_eq!(strip_outer_fence("# Report"), "# Report");
    }

    #[test]
    fn inner_code_fences_survive() {
        let input = "# Report\n```\ncode\n```\nafter";
        assert_eq!(strip_outer_fence(input), input);
    }

    #[test]
    fn drops_chatty_preamble() {
        let input = "Here is the report card:\n\n### Subject: Maths\nbody";
        assert_eq!(drop_preamble(input), "### Subject: Maths\nbody");
    }

    #[test]
    fn keeps_long_or_structured_preamble() {
        let long = "a\nb\nc\nd\n### Subject: Maths";
        assert_eq!(drop_preamble(long), long);
        let bold = "**Student:** Ana\n### Subject: Maths";
        assert_eq!(drop_preamble(bold), bold);
    }

    #[test]
    fn heading_detection() {
        assert!(is_heading("### Subject: Maths"));
        assert!(is_heading("# Report Card"));
        assert!(!is_heading("#hashtag"));
        assert!(!is_heading("####### seven"));
        assert!(!is_heading("plain"));
    }

    #[test]
    fn headings_get_blank_line_before() {
        let out = space_headings("**Total Score:** 8/10\n### Analysis\n- good");
        assert!(out.contains("8/10\n\n### Analysis\n"));
    }

    #[test]
    fn missing_separator_inserted() {
        let out = insert_missing_separator("| Question | Marks |\n| 1 | 2/2 |");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]));
        assert_eq!(lines[1], "| --- | --- |");
    }

    #[test]
    fn well_formed_table_untouched() {
        let input = "| Q | M |\n|---|---|\n| 1 | 2/2 |\n| 2 | 1/2 |";
        assert_eq!(insert_missing_separator(input), input);
        assert_eq!(drop_body_separators(input), input);
    }

    #[test]
    fn body_separators_removed() {
        let input = "| Q | M |\n|---|---|\n| 1 | 2/2 |\n|---|---|\n| 2 | 1/2 |";
        let out = drop_body_separators(input);
        assert_eq!(out.lines().filter(|l| is_separator_row(l)).count(), 1);
        assert!(out.contains("| 2 | 1/2 |"));
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(remove_invisible_chars("8\u{200B}/10\u{FEFF}"), "8/10");
    }

    #[test]
    fn final_newline() {
        assert_eq!(ensure_final_newline("x\n\n\n"), "x\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn full_cleanup() {
        let input = "```markdown\r\nSure! Here you go.\r\n### Subject: Maths   \r\n| Question | Marks Obtained | Comments |\r\n| 1 | 2/2 | |\r\n\r\n\r\n\r\n\r\n**Total Score:** 2/2\r\n```";
        let out = clean_markdown(input);
        assert!(out.starts_with("### Subject: Maths\n"), "got: {out:?}");
        assert!(out.contains("| --- | --- | --- |"));
        assert!(!out.contains('\r'));
        assert!(!out.contains("\n\n\n\n"));
        assert!(out.ends_with("2/2\n"));
    }
}
