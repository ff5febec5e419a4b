//! Split a compiled final report into its result table and analysis.
//!
//! The final report follows a fixed layout (see
//! [`COMPILER_SYSTEM_PROMPT`](crate::prompts::COMPILER_SYSTEM_PROMPT)):
//! a `Result Table` section holding one pipe table, then an
//! `Overall Analysis` section of free text. The scan is line-based and
//! keyed on those two markers, so small deviations in heading level or
//! wording around them are tolerated.

use super::markdown::plain_text;
use crate::pipeline::postprocess::{is_separator_row, is_table_row};

/// The two sections of a final report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalReportSections {
    /// Table rows in order; the first row is the header.
    pub table: Vec<Vec<String>>,
    /// Analysis lines, trimmed, blank lines removed.
    pub analysis: Vec<String>,
}

impl FinalReportSections {
    pub fn has_table(&self) -> bool {
        !self.table.is_empty()
    }

    /// Width of the widest row.
    pub fn column_count(&self) -> usize {
        self.table.iter().map(Vec::len).max().unwrap_or(0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Table,
    Analysis,
}

/// Scan `markdown` for the result table and overall analysis.
///
/// Lines containing `---` and blank lines are skipped everywhere. In the
/// table section only pipe rows are kept, split on `|` with empty cells
/// dropped. Everything after the analysis marker is analysis.
pub fn split_final_report(markdown: &str) -> FinalReportSections {
    let mut sections = FinalReportSections::default();
    let mut section = Section::Preamble;

    for line in markdown.lines() {
        if line.trim().is_empty() || line.contains("---") || is_separator_row(line) {
            continue;
        }
        if line.contains("Result Table") {
            section = Section::Table;
            continue;
        }
        if line.contains("Overall Analysis") {
            section = Section::Analysis;
            continue;
        }

        match section {
            Section::Preamble => {}
            Section::Table => {
                if is_table_row(line) {
                    let cells: Vec<String> = line
                        .split('|')
                        .map(|c| plain_text(c.trim()))
                        .filter(|c| !c.is_empty())
                        .collect();
                    if !cells.is_empty() {
                        sections.table.push(cells);
                    }
                }
            }
            Section::Analysis => sections.analysis.push(line.trim().to_string()),
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINAL: &str = "# Report Card\n\n\
### Result Table\n\n\
| Subject | Total Marks Obtained |\n\
|---------|----------------------|\n\
| Mathematics | 8/10 |\n\
| **Physics** | 14/20 |\n\n\
### Overall Analysis\n\n\
- Strong in algebra.\n\
\n\
  Needs work on units in physics.  \n";

    #[test]
    fn splits_table_and_analysis() {
        let s = split_final_report(FINAL);
        assert_eq!(
            s.table,
            vec![
                vec!["Subject".to_string(), "Total Marks Obtained".to_string()],
                vec!["Mathematics".to_string(), "8/10".to_string()],
                vec!["Physics".to_string(), "14/20".to_string()],
            ]
        );
        assert_eq!(
            s.analysis,
            vec!["- Strong in algebra.", "Needs work on units in physics."]
        );
        assert_eq!(s.column_count(), 2);
        assert!(s.has_table());
    }

    #[test]
    fn title_and_preamble_are_ignored() {
        let s = split_final_report("# Report Card\nSome intro\n### Overall Analysis\nFine.");
        assert!(!s.has_table());
        assert_eq!(s.analysis, vec!["Fine."]);
    }

    #[test]
    fn alignment_separators_skipped() {
        let s = split_final_report("Result Table\n| A | B |\n|:-:|:-:|\n| 1 | 2 |");
        assert_eq!(s.table.len(), 2);
    }

    #[test]
    fn empty_cells_dropped_and_ragged_rows_kept() {
        let s = split_final_report("## Result Table\n| Subject | Marks | Grade |\n| Maths |  | A |\n| Art | 5/5 |");
        assert_eq!(s.table[1], vec!["Maths", "A"]);
        assert_eq!(s.table[2].len(), 2);
        assert_eq!(s.column_count(), 3);
    }

    #[test]
    fn stray_text_in_table_section_ignored() {
        let s = split_final_report("Result Table\nHere it is:\n| A | B |");
        assert_eq!(s.table, vec![vec!["A".to_string(), "B".to_string()]]);
    }
}
