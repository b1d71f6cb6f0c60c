use crate::collectors::resources::{
    CPU_CARD, MEMORY_CARD, PROCESS_CPU_COLUMN, PROCESS_STATUS_COLUMN, STORAGE_USAGE_COLUMN,
    TEMPERATURE_CARD,
};
use crate::config::HealthConfig;
use crate::probe::parse_f64_loose;
use crate::report::{ReportModel, Section, SectionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Notice,
    Warning,
    Critical,
}

impl Severity {
    /// Severity named in a `"[Category] SEVERITY: detail"` warning line.
    pub fn of_warning(line: &str) -> Option<Severity> {
        let rest = line.split_once("] ").map(|(_, r)| r).unwrap_or(line);
        let label = rest.split(':').next()?.trim();
        match label {
            "CRITICAL" => Some(Severity::Critical),
            "WARNING" => Some(Severity::Warning),
            "NOTICE" => Some(Severity::Notice),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Notice => write!(f, "NOTICE"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

pub fn warning(category: &str, severity: Severity, detail: impl fmt::Display) -> String {
    format!("[{category}] {severity}: {detail}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub score: u8,
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct Tally {
    penalty: u32,
    warnings: Vec<String>,
}

impl Tally {
    fn add(&mut self, penalty: u32, warning: Option<String>) {
        self.penalty += penalty;
        self.warnings.extend(warning);
    }
}

fn usable(section: Option<&Section>) -> Option<&Section> {
    section.filter(|s| matches!(s.status, SectionStatus::Ok | SectionStatus::PartialError))
}

/// Penalty for a percentage against (critical, warning, notice) thresholds,
/// worth 20, 15 and 10.
fn tiered(value: f64, thresholds: (f64, f64, f64)) -> Option<(u32, Severity)> {
    let (critical, warning, notice) = thresholds;
    if value > critical {
        Some((20, Severity::Critical))
    } else if value > warning {
        Some((15, Severity::Warning))
    } else if value > notice {
        Some((10, Severity::Notice))
    } else {
        None
    }
}

fn score_load(tally: &mut Tally, category: &str, label: &str, value: Option<f64>, t: (f64, f64, f64)) {
    if let Some((penalty, severity)) = value.and_then(|v| tiered(v, t)) {
        let detail = format!("{label} at {:.1}%", value.unwrap_or_default());
        tally.add(penalty, Some(warning(category, severity, detail)));
    }
}

fn score_disks(tally: &mut Tally, storage: &Section, cfg: &HealthConfig) {
    let mounts = storage.column("Mount");
    let mut penalty = 0;
    for (i, usage) in storage.column(STORAGE_USAGE_COLUMN).into_iter().enumerate() {
        let Some(pct) = parse_f64_loose(usage) else {
            continue;
        };
        let (p, severity) = if pct > cfg.disk_critical {
            (3, Severity::Critical)
        } else if pct > cfg.disk_warning {
            (2, Severity::Warning)
        } else if pct > cfg.disk_notice {
            (1, Severity::Notice)
        } else {
            continue;
        };
        penalty += p;
        let mount = mounts.get(i).copied().unwrap_or("?");
        tally
            .warnings
            .push(warning("Disk", severity, format!("{mount} is {pct:.1}% full")));
    }
    tally.penalty += penalty.min(cfg.disk_penalty_cap);
}

fn score_processes(tally: &mut Tally, processes: &Section, cfg: &HealthConfig) {
    let zombies = processes
        .column(PROCESS_STATUS_COLUMN)
        .iter()
        .filter(|s| s.to_lowercase().contains("zombie"))
        .count();
    if zombies > cfg.zombie_warning {
        tally.add(
            8,
            Some(warning("Processes", Severity::Warning, format!("{zombies} zombie processes"))),
        );
    } else if zombies > 0 {
        tally.add(4, None);
    }

    let busy = processes
        .column(PROCESS_CPU_COLUMN)
        .iter()
        .filter_map(|v| parse_f64_loose(v))
        .filter(|v| *v > cfg.busy_process_percent)
        .count();
    if busy > cfg.busy_process_count {
        tally.add(
            7,
            Some(warning(
                "Processes",
                Severity::Notice,
                format!("{busy} processes above {:.0}% CPU", cfg.busy_process_percent),
            )),
        );
    }
}

/// Scores the finished report: 100 minus penalties, plus bonuses, clamped
/// into 0..=100. Signals whose sections failed are skipped.
pub fn score(model: &ReportModel, cfg: &HealthConfig) -> HealthReport {
    let mut tally = Tally::default();
    let perf = usable(model.section("performance"));
    let card = |name: &str| perf.and_then(|s| s.card(name)).and_then(parse_f64_loose);

    let cpu = card(CPU_CARD);
    let memory = card(MEMORY_CARD);
    score_load(
        &mut tally,
        "CPU",
        "CPU usage",
        cpu,
        (cfg.cpu_critical, cfg.cpu_warning, cfg.cpu_notice),
    );
    score_load(
        &mut tally,
        "Memory",
        "memory usage",
        memory,
        (cfg.memory_critical, cfg.memory_warning, cfg.memory_notice),
    );

    if let Some(storage) = usable(model.section("storage")) {
        score_disks(&mut tally, storage, cfg);
    }

    if let Some(temp) = card(TEMPERATURE_CARD) {
        if temp > cfg.temp_critical_c {
            tally.add(
                12,
                Some(warning("Temperature", Severity::Critical, format!("hottest sensor at {temp:.1} °C"))),
            );
        } else if temp > cfg.temp_warning_c {
            tally.add(
                8,
                Some(warning("Temperature", Severity::Warning, format!("hottest sensor at {temp:.1} °C"))),
            );
        }
    }

    if let Some(processes) = usable(model.section("processes")) {
        score_processes(&mut tally, processes, cfg);
    }

    let mut score = 100_i64 - tally.penalty as i64;
    if matches!((cpu, memory), (Some(c), Some(m)) if c < 30.0 && m < 50.0) {
        score += 5;
    }
    if tally.warnings.is_empty() {
        score += 3;
    }
    HealthReport {
        score: score.clamp(0, 100) as u8,
        warnings: tally.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{HostInfo, SectionKind};
    use chrono::Local;

    fn model(cpu: f64, mem: f64, disks: &[f64], statuses: &[(&str, f64)]) -> ReportModel {
        let mut perf = Section::new("performance", "Performance", SectionKind::Cards, &[]);
        perf.push_card(CPU_CARD, format!("{cpu:.1}%"), "");
        perf.push_card(MEMORY_CARD, format!("{mem:.1}%"), "");
        let mut storage = Section::new(
            "storage",
            "Storage Analysis",
            SectionKind::Table,
            &["Mount", STORAGE_USAGE_COLUMN],
        );
        for (i, d) in disks.iter().enumerate() {
            storage.push_row([format!("/d{i}"), format!("{d:.1}%")]);
        }
        let mut procs = Section::new(
            "processes",
            "Task Manager",
            SectionKind::Table,
            &[PROCESS_CPU_COLUMN, PROCESS_STATUS_COLUMN],
        );
        for (status, cpu) in statuses {
            procs.push_row([format!("{cpu:.1}%"), status.to_string()]);
        }
        ReportModel {
            host: HostInfo {
                hostname: "h".into(),
                platform: "Linux".into(),
                architecture: "x86_64".into(),
                machine: "x86_64".into(),
                bits: 64,
                runtime: "hostscope".into(),
                boot_time: None,
                uptime_secs: 0,
            },
            generated_at: Local::now(),
            health_score: 0,
            warnings: Vec::new(),
            sections: vec![perf, storage, procs],
            canceled: false,
        }
    }

    #[test]
    fn calm_host_scores_full_marks() {
        let r = score(&model(10.0, 40.0, &[12.0], &[]), &HealthConfig::default());
        assert_eq!(r.score, 100);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn degraded_host_collects_tagged_warnings() {
        let r = score(&model(85.0, 90.0, &[96.0], &[]), &HealthConfig::default());
        // CPU warning 15, memory warning 15, one critical disk 3.
        // The table tops out at 33 points off here, so a score of 50 or lower is unreachable.
        assert_eq!(r.score, 67);
        assert!(r.warnings.len() >= 3);
        for w in &r.warnings {
            assert!(
                w.starts_with("[CPU]") || w.starts_with("[Memory]") || w.starts_with("[Disk]"),
                "{w}"
            );
        }
        assert!(r.warnings.contains(&"[Disk] CRITICAL: /d0 is 96.0% full".to_string()));
    }

    #[test]
    fn disk_penalties_are_capped() {
        let disks = [99.0; 8];
        let r = score(&model(50.0, 60.0, &disks, &[]), &HealthConfig::default());
        assert_eq!(r.score, 85);
        assert_eq!(r.warnings.len(), 8);
    }

    #[test]
    fn zombies_and_busy_processes() {
        let mut procs = vec![("Zombie", 0.0); 6];
        procs.extend([("Runnable", 75.0); 4]);
        let r = score(&model(50.0, 60.0, &[], &procs), &HealthConfig::default());
        assert_eq!(r.score, 100 - 8 - 7);

        let r = score(&model(50.0, 60.0, &[], &[("zombie", 0.0)]), &HealthConfig::default());
        assert_eq!(r.score, 100 - 4 + 3);
    }

    #[test]
    fn hot_sensor_and_saturation_clamp() {
        let mut m = model(95.0, 99.0, &[99.0; 6], &[("Zombie", 0.0); 7]);
        m.sections[0].push_card(TEMPERATURE_CARD, "91.0 °C", "Package id 0");
        let r = score(&m, &HealthConfig::default());
        assert_eq!(r.score, 100 - 20 - 20 - 15 - 12 - 8);
        assert_eq!(Severity::of_warning(&r.warnings[0]), Some(Severity::Critical));
    }

    #[test]
    fn failed_sections_are_ignored() {
        let mut m = model(95.0, 99.0, &[99.0], &[]);
        m.sections[0].fail(SectionStatus::Timeout, "timed out");
        m.sections[1].fail(SectionStatus::Fatal, "boom");
        let r = score(&m, &HealthConfig::default());
        assert_eq!(r.score, 100);
    }

    #[test]
    fn severity_parsing() {
        assert_eq!(
            Severity::of_warning("[CPU] NOTICE: CPU usage at 71.0%"),
            Some(Severity::Notice)
        );
        assert_eq!(Severity::of_warning("[Collector] WARNING: x: y"), Some(Severity::Warning));
        assert_eq!(Severity::of_warning("free text"), None);
        assert!(Severity::Critical > Severity::Warning);
    }
}
