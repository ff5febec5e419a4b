//! Report card rendering: markdown parsing, final-report sections, PDF and HTML.

pub mod html;
pub mod markdown;
pub mod pdf;
pub mod sections;

pub use html::render_html;
pub use pdf::{render_final_report_pdf, render_markdown_pdf};
pub use sections::{split_final_report, FinalReportSections};
