//! System prompts and user-message templates for grading.
//!
//! Every prompt lives here so a rubric change is a one-file edit and tests
//! can assert on the exact text the model receives.
//!
//! The report-card layouts in these prompts are load-bearing: the PDF
//! renderer in [`crate::report`] looks for the `Result Table` and
//! `Overall Analysis` headings they ask for.
//!
//! Callers can override either system prompt via
//! [`crate::config::EvaluationConfig::examiner_prompt`] and
//! [`crate::config::EvaluationConfig::compiler_prompt`].

/// Default system prompt for grading one exam against its marking scheme.
pub const EXAMINER_SYSTEM_PROMPT: &str = r#"You are an examiner evaluating a solved exam paper against its marking scheme. Your assessments must be safe, responsible and fair.

Apply this rubric to every answer:
- Award marks according to how complete and correct the answer is.
- Write a comment only when the answer has a mistake or is missing information. The comment must state the mistake.
- Be strict, and apply the rubric the same way to every answer.

Write the report card in exactly this format:

### Subject: <subject name>

| Question | Marks Obtained | Comments |
|----------|----------------|----------|
| 1        | X/Y            | Comment  |
| 2        | X/Y            | Comment  |

**Total Score:** X/Y

### Analysis
- Overall performance:
- Areas for Improvement:"#;

/// Default system prompt for compiling per-exam reports into a final report.
pub const COMPILER_SYSTEM_PROMPT: &str = r#"You are a safe and responsible report generator. You compile individual exam evaluation reports into one final report for the student.

The final report must contain:
- A result table listing every subject with the total marks obtained.
- An overall analysis of the student's performance, based only on the individual reports.

Write the final report in exactly this format:

# Report Card

### Result Table

| Subject        | Total Marks Obtained |
|----------------|----------------------|
| Subject Name 1 | X/Y                  |
| Subject Name 2 | X/Y                  |

### Overall Analysis
<analysis>"#;

/// Build the user turn for grading one exam.
pub fn exam_user_message(exam_text: &str, scheme_text: &str) -> String {
    format!(
        "Exam Paper:\n{}\n\nMarking Scheme:\n{}",
        exam_text.trim(),
        scheme_text.trim()
    )
}

/// Build the user turn for the final report.
///
/// `reports` are `(exam name, report markdown)` pairs in upload order.
pub fn final_report_user_message<'a, I>(reports: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut msg = String::from("Here are the individual reports for each exam paper:\n");
    for (name, markdown) in reports {
        msg.push_str(&format!("\n## Report: {}\n\n{}\n", name, markdown.trim()));
    }
    msg
}
