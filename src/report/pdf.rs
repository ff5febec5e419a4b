//! Report card PDF rendering.
//!
//! Pages are US Letter with one-inch margins, typeset in the two standard
//! Helvetica faces so no font data has to be embedded. Text is encoded as
//! WinAnsi; characters outside that set are written as `?`.
//!
//! Two entry points:
//! - [`render_final_report_pdf`] lays out a compiled final report as a
//!   centred "Report Card" title, the result table with a shaded header
//!   row, and the overall analysis.
//! - [`render_markdown_pdf`] lays out any report markdown block by block
//!   (headings, tables, lists, paragraphs), used for individual exam reports.

use super::markdown::{parse_blocks, plain_text, Block};
use super::sections::split_final_report;
use crate::error::EvalError;
use chrono::Local;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::debug;

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const TOP: f32 = PAGE_HEIGHT - MARGIN;

const HEADER_FILL: [f32; 3] = [0.678, 0.847, 0.902];
const BODY_FILL: [f32; 3] = [0.961, 0.961, 0.961];

const CELL_PAD_X: f32 = 6.0;
const CELL_PAD_TOP: f32 = 3.0;
const CELL_PAD_BOTTOM: f32 = 3.0;
const HEADER_PAD_BOTTOM: f32 = 12.0;
const CELL_SIZE: f32 = 10.0;
const CELL_LEADING: f32 = 12.0;
const LIST_INDENT: f32 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    /// Advance width of one WinAnsi byte in 1/1000 em.
    fn width(self, byte: u8) -> u16 {
        match byte {
            32..=126 => match self {
                Font::Regular => HELVETICA_WIDTHS[(byte - 32) as usize],
                Font::Bold => HELVETICA_BOLD_WIDTHS[(byte - 32) as usize],
            },
            0x91 | 0x92 => 278,
            0x93 | 0x94 => 500,
            0x95 => 350,
            0x97 => 1000,
            _ => 556,
        }
    }
}

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Encode text as WinAnsi bytes.
fn encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => b'?',
        })
        .collect()
}

fn text_width(bytes: &[u8], font: Font, size: f32) -> f32 {
    let units: u32 = bytes.iter().map(|&b| font.width(b) as u32).sum();
    units as f32 * size / 1000.0
}

/// Greedy word wrap. Words wider than the line are broken by character.
fn wrap(bytes: &[u8], font: Font, size: f32, max_width: f32) -> Vec<Vec<u8>> {
    let space = text_width(b" ", font, size);
    let mut lines: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut current_width = 0.0;

    for word in bytes.split(|&b| b == b' ').filter(|w| !w.is_empty()) {
        let word_width = text_width(word, font, size);

        if word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            for &b in word {
                let w = text_width(&[b], font, size);
                if current_width + w > max_width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0.0;
                }
                current.push(b);
                current_width += w;
            }
            continue;
        }

        if current.is_empty() {
            current.extend_from_slice(word);
            current_width = word_width;
        } else if current_width + space + word_width <= max_width {
            current.push(b' ');
            current.extend_from_slice(word);
            current_width += space + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.extend_from_slice(word);
            current_width = word_width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[derive(Debug, Clone, Copy)]
struct Style {
    font: Font,
    size: f32,
    leading: f32,
    space_before: f32,
    space_after: f32,
}

const TITLE: Style = Style {
    font: Font::Bold,
    size: 26.0,
    leading: 30.0,
    space_before: 0.0,
    space_after: 6.0,
};

const HEADING: Style = Style {
    font: Font::Bold,
    size: 14.0,
    leading: 17.0,
    space_before: 10.0,
    space_after: 6.0,
};

const SUBHEADING: Style = Style {
    font: Font::Bold,
    size: 12.0,
    leading: 15.0,
    space_before: 8.0,
    space_after: 4.0,
};

const BODY: Style = Style {
    font: Font::Regular,
    size: 11.0,
    leading: 14.0,
    space_before: 0.0,
    space_after: 6.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Justify,
}

/// Accumulates page content streams top to bottom.
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    ops: Vec<Operation>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            ops: Vec::new(),
            y: TOP,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.ops));
        self.y = TOP;
    }

    /// Break the page unless `height` still fits. A fresh page never breaks.
    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN && self.y < TOP {
            self.new_page();
        }
    }

    fn space(&mut self, height: f32) {
        if self.y < TOP {
            self.y = (self.y - height).max(MARGIN);
        }
    }

    fn text(&mut self, x: f32, baseline: f32, font: Font, size: f32, bytes: Vec<u8>, word_spacing: f32) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new(
            "Tf",
            vec![font.resource().into(), size.into()],
        ));
        if word_spacing != 0.0 {
            self.ops.push(Operation::new("Tw", vec![word_spacing.into()]));
        }
        self.ops.push(Operation::new("Td", vec![x.into(), baseline.into()]));
        self.ops
            .push(Operation::new("Tj", vec![Object::string_literal(bytes)]));
        if word_spacing != 0.0 {
            self.ops.push(Operation::new("Tw", vec![0i64.into()]));
        }
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, rgb: [f32; 3]) {
        self.ops.push(Operation::new(
            "rg",
            vec![rgb[0].into(), rgb[1].into(), rgb[2].into()],
        ));
        self.ops
            .push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        self.ops.push(Operation::new("f", vec![]));
        self.ops.push(Operation::new("g", vec![0i64.into()]));
    }

    fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops
            .push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        self.ops.push(Operation::new("S", vec![]));
    }

    fn paragraph(&mut self, text: &str, style: Style, align: Align) {
        self.block(text, style, align, None);
    }

    fn list_item(&mut self, marker: &str, text: &str) {
        self.block(text, BODY, Align::Left, Some(marker));
    }

    fn block(&mut self, text: &str, style: Style, align: Align, marker: Option<&str>) {
        let indent = if marker.is_some() { LIST_INDENT } else { 0.0 };
        let width = CONTENT_WIDTH - indent;
        let lines = wrap(&encode(text), style.font, style.size, width);
        if lines.is_empty() && marker.is_none() {
            return;
        }

        self.space(style.space_before);
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.into_iter().enumerate() {
            self.ensure(style.leading);
            let baseline = self.y - style.size;
            if i == 0 {
                if let Some(marker) = marker {
                    self.text(MARGIN + 4.0, baseline, style.font, style.size, encode(marker), 0.0);
                }
            }

            let line_width = text_width(&line, style.font, style.size);
            let (x, spacing) = match align {
                Align::Left => (MARGIN + indent, 0.0),
                Align::Center => (MARGIN + indent + (width - line_width).max(0.0) / 2.0, 0.0),
                Align::Justify => {
                    let gaps = line.iter().filter(|&&b| b == b' ').count();
                    if i < last && gaps > 0 {
                        (MARGIN + indent, (width - line_width).max(0.0) / gaps as f32)
                    } else {
                        (MARGIN + indent, 0.0)
                    }
                }
            };
            self.text(x, baseline, style.font, style.size, line, spacing);
            self.y -= style.leading;
        }
        self.space(style.space_after);
    }

    /// Grid table with equal column widths. Row 0 is the header when `header` is set.
    fn table(&mut self, rows: &[Vec<String>], header: bool) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let col_width = CONTENT_WIDTH / columns as f32;
        let text_width_max = (col_width - 2.0 * CELL_PAD_X).max(CELL_SIZE);

        self.ops.push(Operation::new("w", vec![1i64.into()]));
        for (r, row) in rows.iter().enumerate() {
            let is_header = header && r == 0;
            let font = if is_header { Font::Bold } else { Font::Regular };
            let pad_bottom = if is_header { HEADER_PAD_BOTTOM } else { CELL_PAD_BOTTOM };

            let cells: Vec<Vec<Vec<u8>>> = (0..columns)
                .map(|c| {
                    let cell = row.get(c).map(String::as_str).unwrap_or("");
                    wrap(&encode(cell), font, CELL_SIZE, text_width_max)
                })
                .collect();
            let line_count = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let pads = CELL_PAD_TOP + pad_bottom;

            // A row taller than the space left continues on the next page.
            let mut start = 0;
            while start < line_count {
                let remaining = line_count - start;
                let room = ((self.y - MARGIN - pads) / CELL_LEADING).floor().max(0.0) as usize;
                let fits_fresh_page = remaining as f32 * CELL_LEADING + pads <= TOP - MARGIN;
                if remaining > room && self.y < TOP && (fits_fresh_page || room == 0) {
                    self.new_page();
                    continue;
                }
                let take = remaining.min(room).max(1);
                self.table_row_slice(&cells, start..start + take, col_width, font, pads, is_header);
                start += take;
            }
        }
    }

    /// Draw lines `range` of one table row as a box starting at the cursor.
    fn table_row_slice(
        &mut self,
        cells: &[Vec<Vec<u8>>],
        range: std::ops::Range<usize>,
        col_width: f32,
        font: Font,
        pads: f32,
        is_header: bool,
    ) {
        let height = range.len() as f32 * CELL_LEADING + pads;
        let top = self.y;
        let bottom = top - height;
        let fill = if is_header { HEADER_FILL } else { BODY_FILL };
        self.fill_rect(MARGIN, bottom, CONTENT_WIDTH, height, fill);

        for (c, lines) in cells.iter().enumerate() {
            let left = MARGIN + c as f32 * col_width;
            for (i, line) in lines.iter().skip(range.start).take(range.len()).enumerate() {
                let w = text_width(line, font, CELL_SIZE);
                let x = left + (col_width - w).max(0.0) / 2.0;
                let baseline = top - CELL_PAD_TOP - CELL_SIZE - i as f32 * CELL_LEADING;
                self.text(x, baseline, font, CELL_SIZE, line.clone(), 0.0);
            }
            self.stroke_rect(left, bottom, col_width, height);
        }
        self.y = bottom;
    }

    fn rule(&mut self) {
        self.ensure(12.0);
        let y = self.y - 6.0;
        self.ops.push(Operation::new("w", vec![0.5f32.into()]));
        self.ops.push(Operation::new("G", vec![0.5f32.into()]));
        self.ops.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
        self.ops
            .push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
        self.ops.push(Operation::new("S", vec![]));
        self.ops.push(Operation::new("G", vec![0i64.into()]));
        self.y -= 12.0;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.new_page();
        }
        self.pages
    }
}

/// Render a compiled final report: title, result table, overall analysis.
///
/// Fails with [`EvalError::MalformedReport`] when no result table rows
/// can be found.
pub fn render_final_report_pdf(markdown: &str) -> Result<Vec<u8>, EvalError> {
    let sections = split_final_report(markdown);
    if !sections.has_table() {
        return Err(EvalError::MalformedReport(
            "final report has no Result Table rows".to_string(),
        ));
    }

    let mut writer = PageWriter::new();
    writer.paragraph("Report Card", TITLE, Align::Center);
    writer.space(14.4);
    writer.paragraph("Result Table", HEADING, Align::Left);
    writer.space(7.2);
    writer.table(&sections.table, true);
    writer.space(14.4);

    if !sections.analysis.is_empty() {
        writer.paragraph("Overall Analysis", HEADING, Align::Left);
        writer.space(7.2);
        let analysis_line = Style {
            space_after: 2.0,
            ..BODY
        };
        for line in &sections.analysis {
            match line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
                Some(item) => writer.list_item("•", &plain_text(item)),
                None => writer.paragraph(&plain_text(line), analysis_line, Align::Justify),
            }
        }
    }

    debug!(
        "final report PDF: {} table rows, {} analysis lines",
        sections.table.len(),
        sections.analysis.len()
    );
    build_document(writer.finish(), "Report Card")
}

/// Render any report markdown, optionally under a centred title.
pub fn render_markdown_pdf(title: Option<&str>, markdown: &str) -> Result<Vec<u8>, EvalError> {
    let blocks = parse_blocks(markdown);
    if blocks.is_empty() && title.is_none() {
        return Err(EvalError::MalformedReport("report is empty".to_string()));
    }

    let mut writer = PageWriter::new();
    if let Some(title) = title {
        writer.paragraph(title, TITLE, Align::Center);
        writer.space(14.4);
    }

    let mut doc_title = title.map(str::to_string);
    for block in &blocks {
        match block {
            Block::Heading { level, text } => {
                if doc_title.is_none() {
                    doc_title = Some(text.clone());
                }
                let style = match level {
                    1 => TITLE,
                    2 | 3 => HEADING,
                    _ => SUBHEADING,
                };
                let align = if *level == 1 { Align::Center } else { Align::Left };
                writer.paragraph(text, style, align);
            }
            Block::Table { header, rows } => {
                let mut all = Vec::with_capacity(rows.len() + 1);
                all.push(header.clone());
                all.extend(rows.iter().cloned());
                writer.space(4.0);
                writer.table(&all, true);
                writer.space(10.0);
            }
            Block::ListItem { marker, text } => writer.list_item(marker, text),
            Block::Paragraph(text) => writer.paragraph(text, BODY, Align::Justify),
            Block::Rule => writer.rule(),
        }
    }

    let doc_title = doc_title.unwrap_or_else(|| "Report".to_string());
    build_document(writer.finish(), &doc_title)
}

fn build_document(pages: Vec<Vec<Operation>>, title: &str) -> Result<Vec<u8>, EvalError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
    });

    let page_count = pages.len();
    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    for operations in pages {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| EvalError::PdfRender(format!("content stream: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(encode(title)),
        "Producer" => Object::string_literal(format!("exam-evaluator {}", env!("CARGO_PKG_VERSION"))),
        "CreationDate" => Object::string_literal(Local::now().format("D:%Y%m%d%H%M%S").to_string()),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| EvalError::PdfRender(format!("write: {}", e)))?;
    debug!("rendered PDF: {} page(s), {} bytes", page_count, out.len());
    Ok(out)
}
