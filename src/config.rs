use crate::collectors::registry::STANDARD_IDS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_collector_timeout_secs")]
    pub collector_timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Per-collector deadline overrides, keyed by collector id.
    #[serde(default)]
    pub collector_timeouts_secs: BTreeMap<String, u64>,
    #[serde(default = "default_events_limit")]
    pub events_limit: usize,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub health: HealthConfig,
}

/// Thresholds and penalties of the health score. Percent thresholds are
/// exclusive lower bounds: a value must exceed them to count.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    #[serde(default = "default_cpu_critical")]
    pub cpu_critical: f64,
    #[serde(default = "default_cpu_warning")]
    pub cpu_warning: f64,
    #[serde(default = "default_cpu_notice")]
    pub cpu_notice: f64,
    #[serde(default = "default_memory_critical")]
    pub memory_critical: f64,
    #[serde(default = "default_memory_warning")]
    pub memory_warning: f64,
    #[serde(default = "default_memory_notice")]
    pub memory_notice: f64,
    #[serde(default = "default_disk_critical")]
    pub disk_critical: f64,
    #[serde(default = "default_disk_warning")]
    pub disk_warning: f64,
    #[serde(default = "default_disk_notice")]
    pub disk_notice: f64,
    #[serde(default = "default_disk_penalty_cap")]
    pub disk_penalty_cap: u32,
    #[serde(default = "default_temp_critical_c")]
    pub temp_critical_c: f64,
    #[serde(default = "default_temp_warning_c")]
    pub temp_warning_c: f64,
    #[serde(default = "default_zombie_warning")]
    pub zombie_warning: usize,
    #[serde(default = "default_busy_process_percent")]
    pub busy_process_percent: f64,
    #[serde(default = "default_busy_process_count")]
    pub busy_process_count: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cpu_critical: default_cpu_critical(),
            cpu_warning: default_cpu_warning(),
            cpu_notice: default_cpu_notice(),
            memory_critical: default_memory_critical(),
            memory_warning: default_memory_warning(),
            memory_notice: default_memory_notice(),
            disk_critical: default_disk_critical(),
            disk_warning: default_disk_warning(),
            disk_notice: default_disk_notice(),
            disk_penalty_cap: default_disk_penalty_cap(),
            temp_critical_c: default_temp_critical_c(),
            temp_warning_c: default_temp_warning_c(),
            zombie_warning: default_zombie_warning(),
            busy_process_percent: default_busy_process_percent(),
            busy_process_count: default_busy_process_count(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            command_timeout_secs: default_command_timeout_secs(),
            collector_timeout_secs: default_collector_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            parallelism: default_parallelism(),
            collector_timeouts_secs: BTreeMap::new(),
            events_limit: default_events_limit(),
            disabled: Vec::new(),
            health: HealthConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub const MAX_PARALLELISM: usize = 16;

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;
        Self::from_yaml(&text, path_display)
    }

    pub fn from_yaml(text: &str, path: String) -> Result<Self, ConfigError> {
        let cfg: Config =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { path, source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "command_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.collector_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "collector_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "cache_ttl_secs must be > 0".to_string(),
            ));
        }
        if !(1..=MAX_PARALLELISM).contains(&self.parallelism) {
            return Err(ConfigError::Validation(format!(
                "parallelism must be in 1..={MAX_PARALLELISM}"
            )));
        }
        if self.events_limit == 0 {
            return Err(ConfigError::Validation(
                "events_limit must be > 0".to_string(),
            ));
        }
        for (id, secs) in &self.collector_timeouts_secs {
            validate_collector_id("collector_timeouts_secs", id)?;
            if *secs == 0 {
                return Err(ConfigError::Validation(format!(
                    "collector_timeouts_secs '{id}' must be > 0"
                )));
            }
        }
        for id in &self.disabled {
            validate_collector_id("disabled", id)?;
        }
        validate_health(&self.health)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Deadline for one collector: config override, then the collector's own
    /// default, then the global default.
    pub fn collector_timeout(&self, id: &str, builtin: Option<Duration>) -> Duration {
        self.collector_timeouts_secs
            .get(id)
            .map(|secs| Duration::from_secs(*secs))
            .or(builtin)
            .unwrap_or(Duration::from_secs(self.collector_timeout_secs))
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.iter().any(|d| d == id)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

pub fn validate_collector_id(field: &str, id: &str) -> Result<(), ConfigError> {
    if STANDARD_IDS.contains(&id) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field}: unknown collector id '{id}'"
        )))
    }
}

fn validate_health(cfg: &HealthConfig) -> Result<(), ConfigError> {
    let percents = [
        ("cpu_critical", cfg.cpu_critical),
        ("cpu_warning", cfg.cpu_warning),
        ("cpu_notice", cfg.cpu_notice),
        ("memory_critical", cfg.memory_critical),
        ("memory_warning", cfg.memory_warning),
        ("memory_notice", cfg.memory_notice),
        ("disk_critical", cfg.disk_critical),
        ("disk_warning", cfg.disk_warning),
        ("disk_notice", cfg.disk_notice),
        ("busy_process_percent", cfg.busy_process_percent),
    ];
    for (name, value) in percents {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "health.{name} must be in 0..100"
            )));
        }
    }
    for (name, value) in [
        ("temp_critical_c", cfg.temp_critical_c),
        ("temp_warning_c", cfg.temp_warning_c),
    ] {
        if !(0.0..=150.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "health.{name} must be in 0..150"
            )));
        }
    }
    if cfg.cpu_notice > cfg.cpu_warning || cfg.cpu_warning > cfg.cpu_critical {
        return Err(ConfigError::Validation(
            "health cpu thresholds must satisfy notice <= warning <= critical".to_string(),
        ));
    }
    if cfg.memory_notice > cfg.memory_warning || cfg.memory_warning > cfg.memory_critical {
        return Err(ConfigError::Validation(
            "health memory thresholds must satisfy notice <= warning <= critical".to_string(),
        ));
    }
    if cfg.disk_notice > cfg.disk_warning || cfg.disk_warning > cfg.disk_critical {
        return Err(ConfigError::Validation(
            "health disk thresholds must satisfy notice <= warning <= critical".to_string(),
        ));
    }
    if cfg.temp_warning_c > cfg.temp_critical_c {
        return Err(ConfigError::Validation(
            "health.temp_warning_c must be <= temp_critical_c".to_string(),
        ));
    }
    Ok(())
}

const fn default_command_timeout_secs() -> u64 {
    30
}

const fn default_collector_timeout_secs() -> u64 {
    60
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_parallelism() -> usize {
    1
}

const fn default_events_limit() -> usize {
    50
}

const fn default_cpu_critical() -> f64 {
    90.0
}

const fn default_cpu_warning() -> f64 {
    80.0
}

const fn default_cpu_notice() -> f64 {
    70.0
}

const fn default_memory_critical() -> f64 {
    95.0
}

const fn default_memory_warning() -> f64 {
    85.0
}

const fn default_memory_notice() -> f64 {
    75.0
}

const fn default_disk_critical() -> f64 {
    95.0
}

const fn default_disk_warning() -> f64 {
    90.0
}

const fn default_disk_notice() -> f64 {
    85.0
}

const fn default_disk_penalty_cap() -> u32 {
    15
}

const fn default_temp_critical_c() -> f64 {
    85.0
}

const fn default_temp_warning_c() -> f64 {
    75.0
}

const fn default_zombie_warning() -> usize {
    5
}

const fn default_busy_process_percent() -> f64 {
    50.0
}

const fn default_busy_process_count() -> usize {
    3
}
