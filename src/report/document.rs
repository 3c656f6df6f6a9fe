use std::collections::BTreeMap;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Finding, Session, SessionReport, Severity};

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 18.0;
/// A new page starts once the cursor drops below this line.
const BOTTOM_THRESHOLD_MM: f32 = 28.0;
const BODY_LEADING_MM: f32 = 5.5;
const WRAP_COLUMNS: usize = 94;

const BRAND_LINE: &str = "SITECHECK  |  Premises Compliance Analysis";
const DISCLAIMER: &str = "This report is generated from automated visual analysis and does not \
replace an inspection by a licensed compliance officer.";

/// Render the print-ready document. Derives everything from the same
/// aggregated state as the JSON artifact; no recomputation happens here.
pub fn render_document(session: &Session, report: &SessionReport) -> PipelineResult<Vec<u8>> {
    let mut writer = PageWriter::new(&format!("Compliance Report {}", session.id))?;

    writer.title_block(session, report);
    writer.summary_section(report);
    writer.findings_section(report);
    writer.timeline_section(report);
    writer.references_section(report);
    writer.footer();

    writer.into_bytes()
}

/// Cursor-based page writer: tracks the vertical position, breaks to a new
/// page near the bottom margin, and re-emits the brand header on each page.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    fn new(title: &str) -> PipelineResult<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|err| PipelineError::Render(format!("font load failed: {err}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|err| PipelineError::Render(format!("font load failed: {err}")))?;
        let layer = doc.get_page(page).get_layer(layer);

        let mut writer = Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT_MM - MARGIN_MM,
        };
        writer.header();
        Ok(writer)
    }

    fn header(&mut self) {
        self.layer.use_text(
            BRAND_LINE,
            10.0,
            Mm(MARGIN_MM),
            Mm(PAGE_HEIGHT_MM - 12.0),
            &self.bold,
        );
        self.y = PAGE_HEIGHT_MM - MARGIN_MM - 6.0;
    }

    fn break_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "content");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.header();
    }

    fn line(&mut self, text: &str, size: f32, bold: bool) {
        if self.y < BOTTOM_THRESHOLD_MM {
            self.break_page();
        }
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.use_text(text, size, Mm(MARGIN_MM), Mm(self.y), font);
        self.y -= BODY_LEADING_MM * (size / 10.0);
    }

    fn wrapped(&mut self, text: &str, size: f32) {
        for row in wrap(text, WRAP_COLUMNS) {
            self.line(&row, size, false);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn title_block(&mut self, session: &Session, report: &SessionReport) {
        self.gap(8.0);
        self.line("Compliance Analysis Report", 18.0, true);
        self.gap(2.0);
        self.line(&format!("Session: {}", session.id), 11.0, false);
        if !session.areas.is_empty() {
            self.line(&format!("Areas: {}", session.areas.join(", ")), 11.0, false);
        }
        self.line("Analysis type: photo & video walkthrough", 11.0, false);
        self.line(
            &format!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M UTC")),
            11.0,
            false,
        );
        self.gap(4.0);
    }

    fn summary_section(&mut self, report: &SessionReport) {
        self.line("Summary", 14.0, true);
        let s = &report.summary;
        self.line(
            &format!(
                "{} violation(s): {} high, {} medium, {} low",
                s.total_violations, s.high, s.medium, s.low
            ),
            11.0,
            false,
        );
        self.line(
            &format!(
                "Media analyzed: {}  failed: {}",
                s.media_analyzed, s.media_failed
            ),
            11.0,
            false,
        );
        for (category, count) in &s.by_category {
            self.line(&format!("  {category}: {count}"), 10.0, false);
        }
        self.gap(4.0);
    }

    /// Violations grouped by severity, high first. The aggregator already
    /// sorted the list; this only draws the group headings.
    fn findings_section(&mut self, report: &SessionReport) {
        self.line("Findings", 14.0, true);
        let mut current: Option<Severity> = None;
        let mut any = false;

        for finding in violations(report) {
            any = true;
            let severity = finding.severity.unwrap_or(Severity::Low);
            if current != Some(severity) {
                self.gap(2.0);
                self.line(&severity_heading(severity), 12.0, true);
                current = Some(severity);
            }
            self.wrapped(&format!("- {}", finding.description), 10.0);
            let mut meta = Vec::new();
            if let Some(area) = &finding.source.area {
                meta.push(format!("area: {area}"));
            }
            if let Some(citation) = &finding.citation {
                meta.push(format!("citation: {citation}"));
            }
            meta.push(format!("confidence: {:.0}%", finding.confidence * 100.0));
            self.line(&format!("    {}", meta.join("  |  ")), 9.0, false);
        }

        if !any {
            self.line("No violations were detected.", 11.0, false);
        }
        self.gap(4.0);
    }

    /// Per-timestamp view of video-derived findings, including sampled
    /// instants where nothing was found.
    fn timeline_section(&mut self, report: &SessionReport) {
        let mut by_instant: BTreeMap<(usize, u64), Vec<&Finding>> = BTreeMap::new();
        for finding in &report.findings {
            if let Some(ts) = finding.source.timestamp_secs {
                by_instant
                    .entry((finding.source.item_index, ts))
                    .or_default()
                    .push(finding);
            }
        }
        if by_instant.is_empty() {
            return;
        }

        self.line("Video timeline", 14.0, true);
        for ((item_index, ts), findings) in by_instant {
            let stamp = format!("item {} @ {:02}:{:02}", item_index + 1, ts / 60, ts % 60);
            let clean = findings
                .iter()
                .all(|f| f.severity == Some(Severity::Info));
            if clean {
                self.line(&format!("{stamp} - no violations at this timestamp"), 10.0, false);
            } else {
                self.line(&stamp, 10.0, true);
                for finding in findings {
                    if finding.severity != Some(Severity::Info) {
                        self.wrapped(&format!("  - {}", finding.description), 10.0);
                    }
                }
            }
        }
        self.gap(4.0);
    }

    fn references_section(&mut self, report: &SessionReport) {
        let mut citations: Vec<&str> = report
            .findings
            .iter()
            .filter_map(|f| f.citation.as_deref())
            .collect();
        citations.sort_unstable();
        citations.dedup();
        if citations.is_empty() {
            return;
        }

        self.line("References", 14.0, true);
        for citation in citations {
            self.line(&format!("- {citation}"), 10.0, false);
        }
        self.gap(4.0);
    }

    fn footer(&mut self) {
        self.gap(4.0);
        self.wrapped(DISCLAIMER, 8.0);
    }

    fn into_bytes(self) -> PipelineResult<Vec<u8>> {
        let mut bytes = Vec::new();
        {
            let mut buffered = std::io::BufWriter::new(&mut bytes);
            self.doc
                .save(&mut buffered)
                .map_err(|err| PipelineError::Render(format!("pdf save failed: {err}")))?;
        }
        Ok(bytes)
    }
}

fn violations(report: &SessionReport) -> impl Iterator<Item = &Finding> {
    report
        .findings
        .iter()
        .filter(|f| f.severity.map(|s| s.is_violation()).unwrap_or(true))
}

fn severity_heading(severity: Severity) -> String {
    match severity {
        Severity::High => "High severity".to_string(),
        Severity::Medium => "Medium severity".to_string(),
        Severity::Low => "Low severity".to_string(),
        Severity::Info => "Informational".to_string(),
    }
}

/// Greedy word wrap to a fixed column count.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut row = String::new();
    for word in text.split_whitespace() {
        if !row.is_empty() && row.chars().count() + word.chars().count() + 1 > columns {
            rows.push(std::mem::take(&mut row));
        }
        if !row.is_empty() {
            row.push(' ');
        }
        row.push_str(word);
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows
}
