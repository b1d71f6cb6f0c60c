mod cache;
mod cancel;
mod collectors;
mod config;
mod error;
mod executor;
mod health;
mod orchestrator;
mod probe;
mod render;
mod report;
mod runner;
#[cfg(test)]
mod test_support;

use cache::CommandCache;
use cancel::cancel_pair;
use clap::Parser;
use collectors::Registry;
use config::{Config, ConfigError};
use executor::CommandExecutor;
use orchestrator::{effective_timeout, Orchestrator, TracingReporter};
use probe::NativeProbe;
use render::{resolve_output_dir, write_file, write_report, HtmlRenderer, JsonRenderer, ReportRenderer};
use runner::{Os, SystemRunner};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FATAL: u8 = 1;
const EXIT_CANCELED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "hostscope")]
#[command(version, about = "Snapshot the local host into a single HTML report")]
struct Cli {
    /// YAML config file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for the report (default: ~/Downloads, else the current directory).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Also write the report model as JSON; `-` writes it to stdout.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
    /// Number of collectors run at the same time.
    #[arg(long, value_name = "N")]
    parallel: Option<usize>,
    /// Only run these collectors; the rest are reported as skipped.
    #[arg(long, value_delimiter = ',', value_name = "ID,...")]
    only: Vec<String>,
    /// List the collectors and exit.
    #[arg(long)]
    list: bool,
    #[arg(long)]
    print_default_config: bool,
    /// More logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    /// Warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.print_default_config {
        print!("{}", Config::example_yaml());
        return ExitCode::SUCCESS;
    }

    let registry = Registry::standard();
    let cfg = match load_config(&cli, &registry) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if cli.list {
        print_registry(&registry, &cfg);
        return ExitCode::SUCCESS;
    }

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing with a partial report");
            cancel_handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let os = Os::current();
    let cfg = Arc::new(cfg);
    let exec = CommandExecutor::new(
        Arc::new(SystemRunner),
        Arc::new(CommandCache::new(cfg.cache_ttl())),
        os,
        cfg.command_timeout(),
        cancel.clone(),
    );
    let probe = NativeProbe::new(os, Arc::new(exec));
    let mut orchestrator = Orchestrator::new(Arc::new(probe), cfg.clone(), cancel);
    if !cli.only.is_empty() {
        orchestrator = orchestrator.with_only(cli.only.iter().cloned());
    }

    let model = match orchestrator.run(&registry, Arc::new(TracingReporter)).await {
        Ok(model) => model,
        Err(err) => {
            error!(error = %err, "collection failed");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let dir = resolve_output_dir(cli.output_dir.as_deref().or(cfg.output_dir.as_deref()));
    let path = match write_report(&dir, &model, &HtmlRenderer) {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "failed to write the HTML report");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let json_to_stdout = cli.json.as_deref() == Some(Path::new("-"));
    if let Some(target) = &cli.json {
        let written = JsonRenderer.render(&model).and_then(|json| {
            if json_to_stdout {
                println!("{json}");
                Ok(())
            } else {
                write_file(target, &json)
            }
        });
        if let Err(err) = written {
            error!(error = %err, "failed to write the JSON report");
            return ExitCode::from(EXIT_FATAL);
        }
    }
    if !json_to_stdout {
        println!("{}", path.display());
    }

    info!(
        score = model.health_score,
        warnings = model.warnings.len(),
        path = %path.display(),
        "done"
    );
    if model.canceled {
        ExitCode::from(EXIT_CANCELED)
    } else {
        ExitCode::SUCCESS
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli, registry: &Registry) -> Result<Config, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(n) = cli.parallel {
        cfg.parallelism = n;
    }
    if let Some(id) = cli.only.iter().find(|id| !registry.contains(id)) {
        return Err(ConfigError::Validation(format!(
            "--only: unknown collector id '{id}'"
        )));
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_registry(registry: &Registry, cfg: &Config) {
    for line in registry_table(registry, cfg, Os::current()) {
        println!("{line}");
    }
}

fn registry_table(registry: &Registry, cfg: &Config, os: Os) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<12} {:<24} {:>6}  {:<10} {:<10} {:<10} DEPENDS",
        "ID", "TITLE", "WEIGHT", "TIMEOUT", "PLATFORMS", "RUNS HERE"
    )];
    for spec in registry.specs() {
        let platforms = spec
            .platforms
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let runs = if cfg.is_disabled(spec.id) {
            "disabled"
        } else if spec.runs_on(os) {
            "yes"
        } else {
            "no"
        };
        let depends = if spec.depends_on.is_empty() {
            "-".to_string()
        } else {
            spec.depends_on.join(",")
        };
        lines.push(format!(
            "{:<12} {:<24} {:>6}  {:<10} {:<10} {:<10} {}",
            spec.id,
            spec.title,
            spec.weight,
            humantime::format_duration(effective_timeout(cfg, spec)).to_string(),
            platforms,
            runs,
            depends
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "hostscope",
            "--only",
            "overview,storage",
            "--parallel",
            "4",
            "--json",
            "-",
            "-v",
        ])
        .expect("parse");
        assert_eq!(cli.only, ["overview", "storage"]);
        assert_eq!(cli.parallel, Some(4));
        assert_eq!(cli.json.as_deref(), Some(Path::new("-")));
        assert!(cli.verbose);
        assert!(Cli::try_parse_from(["hostscope", "-v", "-q"]).is_err());
    }

    #[test]
    fn unknown_only_id_is_rejected() {
        let cli = Cli::try_parse_from(["hostscope", "--only", "overview,bogus"]).expect("parse");
        assert!(matches!(
            load_config(&cli, &Registry::standard()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn listing_shows_dependencies() {
        let registry = Registry::standard();
        let lines = registry_table(&registry, &Config::default(), Os::Linux);
        assert_eq!(lines.len(), registry.collectors().len() + 1);
        assert!(lines[0].ends_with("DEPENDS"));
        let wifi = lines.iter().find(|l| l.starts_with("wifi ")).expect("wifi row");
        assert!(wifi.ends_with(" netsh"), "{wifi}");
        assert!(wifi.contains(" no "), "{wifi}");
        let overview = lines.iter().find(|l| l.starts_with("overview ")).expect("overview row");
        assert!(overview.ends_with(" -"), "{overview}");
    }

    #[test]
    fn parallel_flag_is_validated() {
        let cli = Cli::try_parse_from(["hostscope", "--parallel", "64"]).expect("parse");
        assert!(load_config(&cli, &Registry::standard()).is_err());
        let cli = Cli::try_parse_from(["hostscope", "--parallel", "8"]).expect("parse");
        assert_eq!(
            load_config(&cli, &Registry::standard())
                .expect("config")
                .parallelism,
            8
        );
    }
}
