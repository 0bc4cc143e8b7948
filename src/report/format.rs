//! Report output formats.

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use std::collections::HashMap;
use std::fmt;
use std::io::{BufWriter, Write};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::measure::{format_duration, PerformanceData, ReportData};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("PDF error: {0}")]
    Pdf(String),
    #[error("unknown format \"{0}\", expected text, json or pdf")]
    Unknown(String),
}

/// Output format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Format {
    Text,
    Json,
    Pdf,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Text => "txt",
            Format::Json => "json",
            Format::Pdf => "pdf",
        }
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            "pdf" => Ok(Format::Pdf),
            _ => Err(FormatError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Text => "TEXT",
            Format::Json => "JSON",
            Format::Pdf => "PDF",
        })
    }
}

/// Renders one site's report data to an output sink.
pub trait Formatter: Send + Sync {
    /// File extension of the rendered output, without the dot.
    fn extension(&self) -> &'static str;
    fn write(&self, data: &ReportData, out: &mut dyn Write) -> Result<(), FormatError>;
}

/// Options shared by the formatters of one registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Include the full entry table where the format supports it.
    pub include_entries: bool,
}

/// Maps each format tag to its formatter.
#[derive(Clone)]
pub struct FormatterRegistry {
    formatters: HashMap<Format, Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    pub fn new(options: FormatOptions) -> Self {
        let mut formatters: HashMap<Format, Arc<dyn Formatter>> = HashMap::new();
        formatters.insert(Format::Text, Arc::new(TextFormatter));
        formatters.insert(Format::Json, Arc::new(JsonFormatter));
        formatters.insert(
            Format::Pdf,
            Arc::new(PdfFormatter {
                include_entries: options.include_entries,
            }),
        );
        Self { formatters }
    }

    pub fn get(&self, format: Format) -> Option<Arc<dyn Formatter>> {
        self.formatters.get(&format).cloned()
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new(FormatOptions::default())
    }
}

// ============================================================================
// Text
// ============================================================================

/// Plain text summary.
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn extension(&self) -> &'static str {
        Format::Text.extension()
    }

    fn write(&self, data: &ReportData, out: &mut dyn Write) -> Result<(), FormatError> {
        writeln!(
            out,
            "Performance data for site {} from {} to {}, generated in {} ms.",
            data.site_name, data.start_date, data.end_date, data.measurement_duration_ms
        )?;
        writeln!(
            out,
            "Files scanned: {} ({} bytes)",
            data.file_count, data.total_files_size
        )?;
        write_text_performance(out, &data.aggregate_performance)?;
        writeln!(out, "Total number of entries: {}", data.entries.len())?;

        for (interval, perf) in &data.focus_interval_performance {
            writeln!(out)?;
            writeln!(out, "Focus interval {} ({} entries):", interval, perf.entry_count)?;
            write_text_performance(out, perf)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn write_text_performance(out: &mut dyn Write, perf: &PerformanceData) -> std::io::Result<()> {
    writeln!(out, "Average response time: {:.2} (ms)", perf.average_response_time)?;
    writeln!(
        out,
        "Percent of requests that were successful: {:.2}",
        perf.success_percent
    )?;
    writeln!(
        out,
        "Uptime: {:.4}% (up {}, down {})",
        perf.uptime_percent,
        format_duration(perf.total_uptime),
        format_duration(perf.total_downtime)
    )
}

// ============================================================================
// JSON
// ============================================================================

/// Pretty-printed dump of the full report data.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn extension(&self) -> &'static str {
        Format::Json.extension()
    }

    fn write(&self, data: &ReportData, out: &mut dyn Write) -> Result<(), FormatError> {
        serde_json::to_writer_pretty(&mut *out, data)?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    }
}

// ============================================================================
// PDF
// ============================================================================

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const VALUE_COLUMN: f32 = 95.0;
const ROW_HEIGHT: f32 = 5.0;
/// Height of a stats block below its title: six rows plus the title gap.
const STATS_HEIGHT: f32 = 3.0 + 6.0 * 6.0;

/// A4 document with a heading, general statistics and focus intervals.
pub struct PdfFormatter {
    pub include_entries: bool,
}

struct PdfFonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Formatter for PdfFormatter {
    fn extension(&self) -> &'static str {
        Format::Pdf.extension()
    }

    fn write(&self, data: &ReportData, out: &mut dyn Write) -> Result<(), FormatError> {
        let (doc, page, layer) = PdfDocument::new(
            format!("Site Performance Report - {}", data.site_name),
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            "Report",
        );
        let fonts = PdfFonts {
            regular: builtin_font(&doc, BuiltinFont::Helvetica)?,
            bold: builtin_font(&doc, BuiltinFont::HelveticaBold)?,
            italic: builtin_font(&doc, BuiltinFont::HelveticaOblique)?,
            mono: builtin_font(&doc, BuiltinFont::CourierBold)?,
        };

        let mut layer = doc.get_page(page).get_layer(layer);
        let mut y = PAGE_HEIGHT - MARGIN;
        y = write_heading(&layer, &fonts, data, y);
        y = write_stats(&layer, &fonts, "General Information", &data.aggregate_performance, y - 12.0);

        for (interval, perf) in &data.focus_interval_performance {
            if y - 8.0 - STATS_HEIGHT < MARGIN {
                layer = new_page(&doc, "Focus Intervals");
                y = PAGE_HEIGHT - MARGIN + 8.0;
            }
            let title = format!("Focus Interval {}", interval);
            y = write_stats(&layer, &fonts, &title, perf, y - 8.0);
        }

        if self.include_entries {
            write_entries(&doc, layer, &fonts, data, y - 12.0);
        }

        let mut writer = BufWriter::new(out);
        doc.save(&mut writer)
            .map_err(|e| FormatError::Pdf(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

fn builtin_font(doc: &PdfDocumentReference, font: BuiltinFont) -> Result<IndirectFontRef, FormatError> {
    doc.add_builtin_font(font)
        .map_err(|e| FormatError::Pdf(e.to_string()))
}

fn write_heading(layer: &PdfLayerReference, fonts: &PdfFonts, data: &ReportData, mut y: f32) -> f32 {
    layer.use_text("Site Performance Report", 24.0, Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 10.0;
    layer.use_text(format!("For the {} site.", data.site_name), 16.0, Mm(MARGIN), Mm(y), &fonts.italic);
    y -= 8.0;
    layer.use_text(
        format!(
            "Measured from {} to {}",
            data.start_date.format("%-d %B %Y"),
            data.end_date.format("%-d %B %Y")
        ),
        12.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 6.0;
    layer.use_text(
        format!(
            "This report was generated at {}",
            data.generated_at.format("%-d %B %Y at %-I:%M%p, UTC")
        ),
        12.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 6.0;
    layer.use_text(
        format!(
            "{} files were processed in {} ms.",
            data.file_count, data.measurement_duration_ms
        ),
        12.0,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 5.0;

    layer.set_outline_color(Color::Rgb(Rgb::new(0.31, 0.11, 0.9, None)));
    layer.set_outline_thickness(3.0);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
    y
}

fn write_stats(
    layer: &PdfLayerReference,
    fonts: &PdfFonts,
    title: &str,
    perf: &PerformanceData,
    mut y: f32,
) -> f32 {
    layer.use_text(title, 18.0, Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 3.0;

    let rows = [
        ("Uptime:", format!("{:.4}%", perf.uptime_percent)),
        ("Average Response Time:", format!("{:.4} ms", perf.average_response_time)),
        ("Successful Request Percentage:", format!("{:.2}%", perf.success_percent)),
        ("Total Uptime:", format_duration(perf.total_uptime)),
        ("Total Downtime:", format_duration(perf.total_downtime)),
        ("Total Measurements Recorded:", perf.entry_count.to_string()),
    ];
    for (label, value) in rows {
        y -= 6.0;
        layer.use_text(label, 12.0, Mm(MARGIN), Mm(y), &fonts.regular);
        layer.use_text(value, 12.0, Mm(VALUE_COLUMN), Mm(y), &fonts.mono);
    }
    y
}

/// Table of every entry, continued on new pages as needed.
fn write_entries(
    doc: &PdfDocumentReference,
    mut layer: PdfLayerReference,
    fonts: &PdfFonts,
    data: &ReportData,
    mut y: f32,
) {
    let columns = [MARGIN, MARGIN + 55.0, MARGIN + 130.0, MARGIN + 150.0];

    if y < MARGIN + 30.0 {
        layer = new_page(doc, "Entries");
        y = PAGE_HEIGHT - MARGIN;
    }
    layer.use_text("All Recorded Entries", 18.0, Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 8.0;

    let header = |layer: &PdfLayerReference, y: f32| {
        for (x, title) in columns.iter().zip(["Timestamp", "URL", "Code", "Time (ms)"]) {
            layer.use_text(title, 9.0, Mm(*x), Mm(y), &fonts.bold);
        }
    };
    header(&layer, y);

    for entry in &data.entries {
        y -= ROW_HEIGHT;
        if y < MARGIN {
            layer = new_page(doc, "Entries");
            y = PAGE_HEIGHT - MARGIN;
            header(&layer, y);
            y -= ROW_HEIGHT;
        }
        let cells = [
            entry.timestamp.to_rfc3339(),
            truncate(&entry.url, 45),
            entry.response_code.to_string(),
            entry.response_time_ms.to_string(),
        ];
        for (x, cell) in columns.iter().zip(cells) {
            layer.use_text(cell, 8.0, Mm(*x), Mm(y), &fonts.regular);
        }
    }
}

fn new_page(doc: &PdfDocumentReference, layer_name: &str) -> PdfLayerReference {
    let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), layer_name);
    doc.get_page(page).get_layer(layer)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}
