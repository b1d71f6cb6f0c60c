use crate::collectors::format::fmt_uptime;
use crate::error::OutputError;
use crate::health::Severity;
use crate::report::{HostInfo, ReportModel, Row, Section, SectionKind, SectionStatus};
use askama::Template;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Warnings shown in the report header.
pub const MAX_HEADER_WARNINGS: usize = 20;

pub trait ReportRenderer {
    fn render(&self, model: &ReportModel) -> Result<String, OutputError>;
}

/// Pretty JSON of the model.
#[derive(Debug, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, model: &ReportModel) -> Result<String, OutputError> {
        Ok(serde_json::to_string_pretty(model)?)
    }
}

/// Self-contained HTML page rendered from `templates/report.html`.
#[derive(Debug, Default)]
pub struct HtmlRenderer;

struct WarningLine<'a> {
    class: &'static str,
    text: &'a str,
}

struct Badge {
    class: &'static str,
    label: &'static str,
}

struct CardView<'a> {
    metric: &'a str,
    value: &'a str,
    details: &'a str,
}

struct SectionView<'a> {
    id: &'a str,
    title: &'a str,
    kind: SectionKind,
    badge: Option<Badge>,
    message: Option<&'a str>,
    no_data: bool,
    columns: &'a [String],
    pairs: Vec<(&'a str, &'a str)>,
    cells: Vec<Vec<&'a str>>,
    cards: Vec<CardView<'a>>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportPage<'a> {
    host: &'a HostInfo,
    generated_at: String,
    booted: Option<String>,
    uptime: String,
    score: u8,
    score_class: &'static str,
    canceled: bool,
    warnings: Vec<WarningLine<'a>>,
    hidden_warnings: usize,
    sections: Vec<SectionView<'a>>,
}

/// Warnings most severe first, ties in original order, cut to `limit`.
pub fn top_warnings(warnings: &[String], limit: usize) -> Vec<&str> {
    let mut sorted: Vec<&str> = warnings.iter().map(String::as_str).collect();
    sorted.sort_by_key(|w| std::cmp::Reverse(Severity::of_warning(w)));
    sorted.truncate(limit);
    sorted
}

fn status_class(status: SectionStatus) -> &'static str {
    match status {
        SectionStatus::Ok => "ok",
        SectionStatus::PartialError => "partial",
        SectionStatus::Timeout => "timeout",
        SectionStatus::Unsupported => "unsupported",
        SectionStatus::Canceled => "canceled",
        SectionStatus::Fatal => "fatal",
    }
}

fn score_class(score: u8) -> &'static str {
    match score {
        80..=100 => "good",
        50..=79 => "fair",
        _ => "poor",
    }
}

fn warning_class(line: &str) -> &'static str {
    match Severity::of_warning(line) {
        Some(Severity::Critical) => "critical",
        Some(Severity::Warning) => "warning",
        _ => "notice",
    }
}

impl<'a> SectionView<'a> {
    fn new(section: &'a Section) -> Self {
        let mut view = SectionView {
            id: &section.id,
            title: &section.title,
            kind: section.kind,
            badge: (section.status != SectionStatus::Ok).then(|| Badge {
                class: status_class(section.status),
                label: section.status.as_str(),
            }),
            message: section.message.as_deref(),
            no_data: section.rows.is_empty() && section.status == SectionStatus::Ok,
            columns: &section.columns,
            pairs: Vec::new(),
            cells: Vec::new(),
            cards: Vec::new(),
        };
        for row in &section.rows {
            match row {
                Row::KeyValue { key, value } => view.pairs.push((key.as_str(), value.as_str())),
                Row::Table { cells } => view
                    .cells
                    .push(cells.iter().map(|(_, v)| v.as_str()).collect()),
                Row::Card {
                    metric,
                    value,
                    details,
                } => view.cards.push(CardView {
                    metric: metric.as_str(),
                    value: value.as_str(),
                    details: details.as_str(),
                }),
            }
        }
        view
    }
}

impl ReportRenderer for HtmlRenderer {
    fn render(&self, model: &ReportModel) -> Result<String, OutputError> {
        let top = top_warnings(&model.warnings, MAX_HEADER_WARNINGS);
        let page = ReportPage {
            host: &model.host,
            generated_at: model.generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            booted: model
                .host
                .boot_time
                .map(|b| b.format("%Y-%m-%d %H:%M:%S").to_string()),
            uptime: fmt_uptime(model.host.uptime_secs),
            score: model.health_score,
            score_class: score_class(model.health_score),
            canceled: model.canceled,
            hidden_warnings: model.warnings.len() - top.len(),
            warnings: top
                .into_iter()
                .map(|text| WarningLine {
                    class: warning_class(text),
                    text,
                })
                .collect(),
            sections: model.sections.iter().map(SectionView::new).collect(),
        };
        Ok(page.render()?)
    }
}

pub fn report_file_name(at: DateTime<Local>) -> String {
    format!("System_Report_{}.html", at.format("%Y%m%d_%H%M%S"))
}

/// The override when given, else `~/Downloads` when it exists, else the
/// current directory.
pub fn resolve_output_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    if let Some(downloads) = dirs::home_dir().map(|h| h.join("Downloads")) {
        if downloads.is_dir() {
            return downloads;
        }
    }
    debug!("no Downloads directory; writing to the current directory");
    PathBuf::from(".")
}

/// Renders `model` into `dir` under the timestamped report name.
pub fn write_report(
    dir: &Path,
    model: &ReportModel,
    renderer: &dyn ReportRenderer,
) -> Result<PathBuf, OutputError> {
    let path = dir.join(report_file_name(model.generated_at));
    write_file(&path, &renderer.render(model)?)?;
    info!(path = %path.display(), "report written");
    Ok(path)
}

/// Writes UTF-8 text, creating missing parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<(), OutputError> {
    let to_err = |source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::write(path, contents).map_err(to_err)
}
