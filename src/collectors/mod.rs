pub mod audit;
pub mod format;
pub mod inventory;
pub mod network;
pub mod registry;
pub mod resources;
pub mod system;

use crate::cancel::CancelToken;
use crate::error::CollectError;
use crate::probe::PlatformProbe;
use crate::report::{Section, SectionKind};
use crate::runner::Os;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    Windows,
    Any,
}

impl Platform {
    pub fn matches(&self, os: Os) -> bool {
        matches!(
            (self, os),
            (Platform::Any, _) | (Platform::Windows, Os::Windows)
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => f.write_str("Windows"),
            Platform::Any => f.write_str("Any"),
        }
    }
}

pub const ANY: &[Platform] = &[Platform::Any];
pub const WINDOWS_ONLY: &[Platform] = &[Platform::Windows];

/// Static description of a collector. Registry order is report order.
#[derive(Debug, Clone)]
pub struct CollectorSpec {
    pub id: &'static str,
    pub title: &'static str,
    pub kind: SectionKind,
    /// Table header; empty for KeyValue and Cards sections.
    pub columns: &'static [&'static str],
    /// Relative share of the progress bar, 1..=100.
    pub weight: u32,
    /// Deadline override; `None` uses the configured default.
    pub timeout: Option<Duration>,
    pub platforms: &'static [Platform],
    /// External commands the collector shells out to.
    pub depends_on: &'static [&'static str],
}

impl CollectorSpec {
    pub fn runs_on(&self, os: Os) -> bool {
        self.platforms.iter().any(|p| p.matches(os))
    }

    pub fn section(&self) -> Section {
        Section::new(self.id, self.title, self.kind, self.columns)
    }
}

#[derive(Clone)]
pub struct CollectContext {
    pub probe: Arc<dyn PlatformProbe>,
    pub cancel: CancelToken,
    pub events_limit: usize,
}

#[async_trait]
pub trait Collector: Send + Sync {
    fn spec(&self) -> &CollectorSpec;

    /// Builds the section. An `Err` becomes a failed section of the matching
    /// status; it never aborts the run.
    async fn collect(&self, ctx: &CollectContext) -> Result<Section, CollectError>;
}

/// Runs an optional lookup, recording a failure on the section instead of
/// failing the collector. Cancellation still propagates.
pub(crate) fn optional<T>(
    section: &mut Section,
    what: &str,
    result: Result<T, CollectError>,
) -> Result<Option<T>, CollectError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(CollectError::Canceled) => Err(CollectError::Canceled),
        Err(CollectError::Unsupported(_)) => Ok(None),
        Err(err) => {
            section.mark_partial(format!("{what}: {err}"));
            Ok(None)
        }
    }
}
