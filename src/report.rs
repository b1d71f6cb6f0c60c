use crate::error::{CollectError, ErrorKind};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    KeyValue,
    Table,
    Cards,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionStatus {
    #[serde(rename = "OK")]
    Ok,
    PartialError,
    Timeout,
    Unsupported,
    Canceled,
    Fatal,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Ok => "OK",
            SectionStatus::PartialError => "Partial Error",
            SectionStatus::Timeout => "Timeout",
            SectionStatus::Unsupported => "Unsupported",
            SectionStatus::Canceled => "Canceled",
            SectionStatus::Fatal => "Fatal",
        }
    }

    pub fn for_error(err: &CollectError) -> Self {
        match err.kind() {
            ErrorKind::Unsupported => SectionStatus::Unsupported,
            ErrorKind::Timeout => SectionStatus::Timeout,
            ErrorKind::Canceled => SectionStatus::Canceled,
            ErrorKind::InternalError => SectionStatus::Fatal,
            _ => SectionStatus::PartialError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Row {
    KeyValue {
        key: String,
        value: String,
    },
    /// Cells in header order; every header key is present.
    Table {
        cells: Vec<(String, String)>,
    },
    Card {
        metric: String,
        value: String,
        details: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub kind: SectionKind,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub collected_at: DateTime<Local>,
    pub duration_ms: u64,
    pub status: SectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Section {
    pub fn new(id: &str, title: &str, kind: SectionKind, columns: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
            collected_at: Local::now(),
            duration_ms: 0,
            status: SectionStatus::Ok,
            message: None,
            error_kind: None,
        }
    }

    pub fn push_kv(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.rows.push(Row::KeyValue {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Appends a table row from positional values; missing trailing cells are
    /// empty and extra values are dropped.
    pub fn push_row<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut values = values.into_iter().map(Into::into);
        let cells = self
            .columns
            .iter()
            .map(|col| (col.clone(), values.next().unwrap_or_default()))
            .collect();
        self.rows.push(Row::Table { cells });
    }

    pub fn push_card(
        &mut self,
        metric: impl Into<String>,
        value: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.rows.push(Row::Card {
            metric: metric.into(),
            value: value.into(),
            details: details.into(),
        });
    }

    /// Keeps the rows already collected but flags the section as degraded.
    pub fn mark_partial(&mut self, reason: impl Into<String>) {
        self.status = SectionStatus::PartialError;
        let reason = reason.into();
        self.message = Some(match self.message.take() {
            Some(prev) => format!("{prev}; {reason}"),
            None => reason,
        });
    }

    /// Turns the section into a failed one. Fatal sections lose their rows and
    /// columns and switch to the Error kind; other statuses keep the header.
    pub fn fail(&mut self, status: SectionStatus, message: impl Into<String>) {
        self.rows.clear();
        self.status = status;
        self.message = Some(message.into());
        if status == SectionStatus::Fatal {
            self.kind = SectionKind::Error;
            self.columns.clear();
        }
    }

    pub fn fail_with(&mut self, err: &CollectError) {
        self.fail(SectionStatus::for_error(err), err.to_string());
        self.error_kind = Some(err.kind());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.rows.iter().find_map(|row| match row {
            Row::KeyValue { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn set_value(&mut self, key: &str, new_value: impl Into<String>) {
        let new_value = new_value.into();
        for row in &mut self.rows {
            if let Row::KeyValue { key: k, value } = row {
                if k == key {
                    *value = new_value;
                    return;
                }
            }
        }
        self.push_kv(key, new_value);
    }

    pub fn card(&self, metric: &str) -> Option<&str> {
        self.rows.iter().find_map(|row| match row {
            Row::Card {
                metric: m, value, ..
            } if m == metric => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn column(&self, name: &str) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| match row {
                Row::Table { cells } => cells
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,
    pub platform: String,
    pub architecture: String,
    pub machine: String,
    pub bits: u32,
    pub runtime: String,
    pub boot_time: Option<DateTime<Local>>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportModel {
    pub host: HostInfo,
    pub generated_at: DateTime<Local>,
    pub health_score: u8,
    pub warnings: Vec<String>,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub canceled: bool,
}

impl ReportModel {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }
}
