//! PDF assessment report.
//!
//! Layout is computed as plain lines first ([`layout_lines`]) and then
//! written to A4 pages with the built-in Helvetica fonts. Those fonts only
//! cover a single-byte encoding, so text is folded to ASCII when written
//! ([`pdf_text`]).

use posecoach_models::{ComparisonReport, VideoLink};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use tracing::debug;

use crate::error::{MediaError, MediaResult};

pub const REPORT_TITLE: &str = "Exercise Analysis Report";
pub const VIDEO_UNAVAILABLE_HEADING: &str = "Video unavailable";
pub const VIDEO_UNAVAILABLE_TEXT: &str = "The comparison video could not be generated.";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const WRAP_COLUMNS: usize = 90;

/// Visual role of a report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
}

impl LineStyle {
    fn font_size(&self) -> f32 {
        match self {
            LineStyle::Title => 18.0,
            LineStyle::Heading => 14.0,
            LineStyle::Body => 11.0,
        }
    }

    /// Vertical space taken by one line, in mm.
    fn advance(&self) -> f32 {
        match self {
            LineStyle::Title => 12.0,
            LineStyle::Heading => 9.0,
            LineStyle::Body => 6.0,
        }
    }

    fn space_before(&self) -> f32 {
        match self {
            LineStyle::Heading => 4.0,
            _ => 0.0,
        }
    }
}

/// One laid-out line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub style: LineStyle,
    pub text: String,
}

impl ReportLine {
    fn new(style: LineStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

/// Lay out the report as styled, wrapped lines.
pub fn layout_lines(report: &ComparisonReport) -> Vec<ReportLine> {
    let mut lines = vec![
        ReportLine::new(LineStyle::Title, REPORT_TITLE),
        ReportLine::new(LineStyle::Body, format!("Student: {}", report.student)),
        ReportLine::new(
            LineStyle::Body,
            format!("Overall deviation score: {:.2}", report.overall_average_error),
        ),
        ReportLine::new(LineStyle::Heading, "Main corrections"),
    ];

    if report.insights.is_empty() {
        lines.push(ReportLine::new(LineStyle::Body, "No significant deviations detected."));
    }
    for insight in &report.insights {
        push_wrapped(&mut lines, &format!("- {}", insight));
    }

    if let Some(feedback) = report.feedback.as_deref().filter(|f| !f.trim().is_empty()) {
        lines.push(ReportLine::new(LineStyle::Heading, "Personalized feedback"));
        for paragraph in feedback.lines().filter(|p| !p.trim().is_empty()) {
            push_wrapped(&mut lines, paragraph.trim());
        }
    }

    match &report.video {
        VideoLink::Available { url } => {
            lines.push(ReportLine::new(LineStyle::Heading, "Comparison video"));
            push_wrapped(&mut lines, url);
        }
        VideoLink::Unavailable => {
            lines.push(ReportLine::new(LineStyle::Heading, VIDEO_UNAVAILABLE_HEADING));
            lines.push(ReportLine::new(LineStyle::Body, VIDEO_UNAVAILABLE_TEXT));
        }
    }

    lines
}

fn push_wrapped(lines: &mut Vec<ReportLine>, text: &str) {
    for line in wrap(text, WRAP_COLUMNS) {
        lines.push(ReportLine::new(LineStyle::Body, line));
    }
}

/// Greedy word wrap; words longer than `width` are split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for piece in chars.chunks(width) {
            let piece: String = piece.iter().collect();
            let needed = if current.is_empty() {
                piece.chars().count()
            } else {
                current.chars().count() + 1 + piece.chars().count()
            };
            if needed > width && !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Fold `text` to printable ASCII for the built-in fonts.
///
/// Accented Latin letters lose their marks, degrees become "deg" and
/// anything else outside ASCII becomes `?`.
pub fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
            continue;
        }
        let folded = match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
            'ç' => "c",
            'Ç' => "C",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'È' | 'É' | 'Ê' | 'Ë' => "E",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'Ì' | 'Í' | 'Î' | 'Ï' => "I",
            'ñ' => "n",
            'Ñ' => "N",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
            'ù' | 'ú' | 'û' | 'ü' => "u",
            'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
            'ý' | 'ÿ' => "y",
            'Ý' => "Y",
            'ß' => "ss",
            'æ' => "ae",
            'Æ' => "AE",
            'œ' => "oe",
            'Œ' => "OE",
            '°' => " deg",
            '‘' | '’' => "'",
            '“' | '”' => "\"",
            '–' | '—' => "-",
            '…' => "...",
            '\t' => " ",
            _ => "?",
        };
        out.push_str(folded);
    }
    out
}

/// Renders [`ComparisonReport`]s to PDF bytes.
#[derive(Debug, Clone, Default)]
pub struct PdfReportRenderer;

impl PdfReportRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, report: &ComparisonReport) -> MediaResult<Vec<u8>> {
        let lines = layout_lines(report);

        let (doc, page, layer) =
            PdfDocument::new(REPORT_TITLE, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(MediaError::report)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(MediaError::report)?;

        let mut current = doc.get_page(page).get_layer(layer);
        let mut y = PAGE_HEIGHT_MM - MARGIN_MM;
        let mut pages = 1;

        for line in &lines {
            let needed = line.style.space_before() + line.style.advance();
            if y - needed < MARGIN_MM {
                let (page, layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
                current = doc.get_page(page).get_layer(layer);
                y = PAGE_HEIGHT_MM - MARGIN_MM;
                pages += 1;
            }
            y -= needed;
            let font: &IndirectFontRef = match line.style {
                LineStyle::Body => &regular,
                _ => &bold,
            };
            current.use_text(
                pdf_text(&line.text),
                line.style.font_size(),
                Mm(MARGIN_MM),
                Mm(y),
                font,
            );
        }

        let bytes = doc
            .save_to_bytes()
            .map_err(MediaError::report)?;
        debug!(pages, lines = lines.len(), bytes = bytes.len(), "Rendered report");
        Ok(bytes)
    }
}
