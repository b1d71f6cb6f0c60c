use crate::cancel::CancelToken;
use crate::collectors::system::HEALTH_SCORE_KEY;
use crate::collectors::{CollectContext, Collector, CollectorSpec, Registry};
use crate::config::Config;
use crate::error::{CollectError, ErrorKind, RunError};
use crate::health::{self, Severity};
use crate::probe::PlatformProbe;
use crate::report::{HostInfo, ReportModel, Section, SectionStatus};
use chrono::Local;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Start {
        id: String,
    },
    Progress {
        done_weight: u32,
        total_weight: u32,
    },
    Finish {
        id: String,
        status: SectionStatus,
    },
}

/// All user-visible progress output goes through here.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

#[derive(Debug, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Start { id } => debug!(collector = %id, "collector started"),
            ProgressEvent::Progress {
                done_weight,
                total_weight,
            } => {
                let pct = if *total_weight == 0 {
                    100
                } else {
                    done_weight * 100 / total_weight
                };
                info!(done = done_weight, total = total_weight, "progress {pct}%");
            }
            ProgressEvent::Finish { id, status } => match status {
                SectionStatus::Ok | SectionStatus::Unsupported => {
                    info!(collector = %id, status = status.as_str(), "collector finished")
                }
                _ => warn!(collector = %id, status = status.as_str(), "collector finished"),
            },
        }
    }
}

/// Runs the registry against one probe and assembles the report.
#[derive(Clone)]
pub struct Orchestrator {
    probe: Arc<dyn PlatformProbe>,
    config: Arc<Config>,
    cancel: CancelToken,
    only: Option<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(probe: Arc<dyn PlatformProbe>, config: Arc<Config>, cancel: CancelToken) -> Self {
        Self {
            probe,
            config,
            cancel,
            only: None,
        }
    }

    /// Restricts the run to the given ids; every other collector is reported
    /// as skipped.
    pub fn with_only(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.only = Some(ids.into_iter().collect());
        self
    }

    fn context(&self) -> CollectContext {
        CollectContext {
            probe: self.probe.clone(),
            cancel: self.cancel.clone(),
            events_limit: self.config.events_limit,
        }
    }

    fn skip_reason(&self, spec: &CollectorSpec) -> Option<String> {
        if self.config.is_disabled(spec.id) {
            return Some("disabled by configuration".to_string());
        }
        if let Some(only) = &self.only {
            if !only.contains(spec.id) {
                return Some("skipped by --only".to_string());
            }
        }
        let os = self.probe.os();
        if !spec.runs_on(os) {
            let on = spec
                .platforms
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Some(format!("{} is only available on {on}, not {os}", spec.title));
        }
        None
    }

    async fn host_info(&self) -> Result<HostInfo, RunError> {
        let host = self
            .probe
            .host_info()
            .await
            .map_err(|err| RunError::HostIdentification(err.to_string()))?;
        if host.hostname.trim().is_empty() {
            return Err(RunError::HostIdentification("empty hostname".to_string()));
        }
        let boot_time = match self.probe.boot_time().await {
            Ok(t) => Some(t),
            Err(err) => {
                debug!(error = %err, "boot time unavailable");
                None
            }
        };
        let uptime_secs = boot_time
            .map(|b| (Local::now() - b).num_seconds().max(0) as u64)
            .unwrap_or(0);
        Ok(HostInfo {
            hostname: host.hostname,
            platform: host.platform,
            architecture: host.architecture,
            machine: host.machine_type,
            bits: host.bits,
            runtime: host.runtime_version,
            boot_time,
            uptime_secs,
        })
    }

    /// Runs one collector under its deadline. Never fails: every outcome is a
    /// section.
    pub async fn run_collector(&self, collector: Arc<dyn Collector>) -> Section {
        let spec = collector.spec().clone();
        if let Some(reason) = self.skip_reason(&spec) {
            let mut section = spec.section();
            section.fail(SectionStatus::Unsupported, reason);
            section.error_kind = Some(ErrorKind::Unsupported);
            return section;
        }
        if self.cancel.is_canceled() {
            return canceled_section(&spec);
        }

        let deadline = self.config.collector_timeout(spec.id, spec.timeout);
        let ctx = self.context();
        let started = Instant::now();
        let collected_at = Local::now();
        let task = tokio::spawn(async move { collector.collect(&ctx).await });
        let abort = task.abort_handle();

        let outcome = tokio::select! {
            joined = tokio::time::timeout(deadline, task) => match joined {
                Ok(Ok(result)) => result.map_err(Failure::Collect),
                Ok(Err(join_err)) if join_err.is_panic() => {
                    Err(Failure::Panic(panic_message(join_err.into_panic())))
                }
                Ok(Err(join_err)) => Err(Failure::Panic(join_err.to_string())),
                Err(_) => {
                    abort.abort();
                    Err(Failure::Collect(CollectError::Timeout(deadline)))
                }
            },
            _ = self.cancel.canceled() => {
                abort.abort();
                Err(Failure::Collect(CollectError::Canceled))
            }
        };

        let mut section = match outcome {
            Ok(mut section) => {
                section.id = spec.id.to_string();
                section.title = spec.title.to_string();
                section
            }
            Err(Failure::Collect(err)) => {
                let mut section = spec.section();
                section.fail_with(&err);
                section
            }
            Err(Failure::Panic(msg)) => {
                let mut section = spec.section();
                section.fail(SectionStatus::Fatal, format!("collector panicked: {msg}"));
                section.error_kind = Some(ErrorKind::InternalError);
                section
            }
        };
        section.collected_at = collected_at;
        section.duration_ms = started.elapsed().as_millis() as u64;
        section
    }

    /// Runs every collector and returns the report. Only a failure to
    /// identify the host is an error.
    pub async fn run(
        &self,
        registry: &Registry,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<ReportModel, RunError> {
        let host = self.host_info().await?;
        let generated_at = Local::now();
        info!(
            host = %host.hostname,
            collectors = registry.collectors().len(),
            parallelism = self.config.parallelism,
            "starting collection"
        );

        let sections = if self.config.parallelism > 1 {
            self.run_parallel(registry, reporter).await
        } else {
            self.run_sequential(registry, reporter.as_ref()).await
        };

        let mut model = ReportModel {
            host,
            generated_at,
            health_score: 0,
            warnings: Vec::new(),
            sections,
            canceled: false,
        };
        self.finish(&mut model);
        Ok(model)
    }

    async fn run_sequential(
        &self,
        registry: &Registry,
        reporter: &dyn ProgressReporter,
    ) -> Vec<Section> {
        let total_weight = registry.total_weight();
        let mut done_weight = 0;
        let mut sections = Vec::with_capacity(registry.collectors().len());
        for collector in registry.collectors() {
            let spec = collector.spec();
            if self.cancel.is_canceled() {
                sections.push(canceled_section(spec));
                continue;
            }
            reporter.report(&ProgressEvent::Start {
                id: spec.id.to_string(),
            });
            let section = self.run_collector(collector.clone()).await;
            done_weight += spec.weight;
            let status = section.status;
            sections.push(section);
            reporter.report(&ProgressEvent::Progress {
                done_weight,
                total_weight,
            });
            reporter.report(&ProgressEvent::Finish {
                id: spec.id.to_string(),
                status,
            });
        }
        sections
    }

    /// Bounded parallel run. Results land in registry order regardless of
    /// completion order; progress is reported from this task only, so it
    /// stays monotonic.
    async fn run_parallel(
        &self,
        registry: &Registry,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Vec<Section> {
        let total_weight = registry.total_weight();
        let permits = Arc::new(Semaphore::new(self.config.parallelism));
        let mut tasks = JoinSet::new();
        for (idx, collector) in registry.collectors().iter().enumerate() {
            let this = self.clone();
            let collector = collector.clone();
            let permits = permits.clone();
            let reporter = reporter.clone();
            tasks.spawn(async move {
                let spec = collector.spec().clone();
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, canceled_section(&spec));
                };
                if this.cancel.is_canceled() {
                    return (idx, canceled_section(&spec));
                }
                reporter.report(&ProgressEvent::Start {
                    id: spec.id.to_string(),
                });
                (idx, this.run_collector(collector).await)
            });
        }

        let mut slots: Vec<Option<Section>> = vec![None; registry.collectors().len()];
        let mut done_weight = 0;
        while let Some(joined) = tasks.join_next().await {
            let (idx, section) = match joined {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "collector task failed to join");
                    continue;
                }
            };
            let spec = registry.collectors()[idx].spec();
            done_weight += spec.weight;
            reporter.report(&ProgressEvent::Progress {
                done_weight,
                total_weight,
            });
            reporter.report(&ProgressEvent::Finish {
                id: spec.id.to_string(),
                status: section.status,
            });
            slots[idx] = Some(section);
        }

        slots
            .into_iter()
            .zip(registry.collectors())
            .map(|(slot, collector)| {
                slot.unwrap_or_else(|| {
                    let mut s = collector.spec().section();
                    s.fail(SectionStatus::Fatal, "collector task was lost");
                    s.error_kind = Some(ErrorKind::InternalError);
                    s
                })
            })
            .collect()
    }

    fn finish(&self, model: &mut ReportModel) {
        let health = health::score(model, &self.config.health);
        model.health_score = health.score;
        if let Some(overview) = model.sections.iter_mut().find(|s| s.id == "overview") {
            if overview.value(HEALTH_SCORE_KEY).is_some() {
                overview.set_value(HEALTH_SCORE_KEY, format!("{}/100", health.score));
            }
        }

        model.warnings = health.warnings;
        for s in &model.sections {
            let severity = match s.status {
                SectionStatus::Fatal => Severity::Critical,
                SectionStatus::PartialError | SectionStatus::Timeout => Severity::Warning,
                _ => continue,
            };
            let detail = format!(
                "{}: {}",
                s.title,
                s.message.as_deref().unwrap_or(s.status.as_str())
            );
            model
                .warnings
                .push(health::warning("Collector", severity, detail));
        }

        model.canceled = self.cancel.is_canceled()
            || model
                .sections
                .iter()
                .any(|s| s.status == SectionStatus::Canceled);
        info!(
            score = model.health_score,
            warnings = model.warnings.len(),
            canceled = model.canceled,
            "collection finished"
        );
    }
}

enum Failure {
    Collect(CollectError),
    Panic(String),
}

fn canceled_section(spec: &CollectorSpec) -> Section {
    let mut section = spec.section();
    section.fail_with(&CollectError::Canceled);
    section
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub fn effective_timeout(config: &Config, spec: &CollectorSpec) -> Duration {
    config.collector_timeout(spec.id, spec.timeout)
}
