//! Calib CLI - run detector calibration binaries singly or as a bounded batch

mod logging;
mod report;

use anyhow::{bail, Context, Result};
use calib_core::application::{
    shutdown_channel, BatchManifest, CalibrationService, JobRequest, JobRunner, ShutdownSender,
};
use calib_core::port::{SystemTimeProvider, UuidProvider};
use calib_core::{CalibratorCatalog, SchedulerConfig, ToolchainConfig};
use calib_infra_system::{ChildOutput, SubprocessLauncher};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Exit status after a second interrupt (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "calib")]
#[command(about = "Detector calibration job orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Discard the console output of the calibration binaries
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in calibrators
    List,

    /// Run one calibrator and print its quantities
    Run {
        /// Calibrator name (see `calib list`)
        calibrator: String,

        /// Parameter value, repeatable (e.g. -p photon-energy=20)
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Enable a switch parameter, repeatable
        #[arg(short = 's', long = "switch")]
        switches: Vec<String>,

        /// List parameter as comma-separated values (e.g. -l energies=10,20,50)
        #[arg(short = 'l', long = "list", value_parser = parse_key_value)]
        lists: Vec<(String, String)>,

        /// Label shown in logs and reports
        #[arg(long)]
        label: Option<String>,

        /// Prefix of the report file the binary writes
        #[arg(long)]
        output_prefix: Option<String>,

        /// Keep the report file after reading it
        #[arg(long)]
        keep_artifact: bool,
    },

    /// Run every job of a JSON manifest under a concurrency cap
    Batch {
        /// Path to the batch manifest
        manifest: PathBuf,

        /// Maximum number of binaries running at once
        #[arg(long, env = "CALIB_MAX_CONCURRENCY")]
        max_concurrency: Option<usize>,

        /// Delay between status polls in milliseconds
        #[arg(long, env = "CALIB_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{}'", raw)),
    }
}

fn run_request(
    calibrator: String,
    params: Vec<(String, String)>,
    switches: Vec<String>,
    lists: Vec<(String, String)>,
    label: Option<String>,
    output_prefix: Option<String>,
    keep_artifact: bool,
) -> JobRequest {
    JobRequest {
        label,
        parameters: params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
        switches,
        lists: lists
            .into_iter()
            .map(|(k, v)| {
                let items = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect();
                (k, items)
            })
            .collect(),
        output_prefix,
        keep_artifact: keep_artifact.then_some(true),
        ..JobRequest::new(calibrator)
    }
}

fn service(cli: &Cli, config: SchedulerConfig) -> CalibrationService {
    let output = if cli.quiet {
        ChildOutput::Discard
    } else if cli.json {
        ChildOutput::Stderr
    } else {
        ChildOutput::Inherit
    };
    let launcher = Arc::new(SubprocessLauncher::new().with_output(output));
    let runner = Arc::new(JobRunner::new(launcher, Arc::new(SystemTimeProvider)));
    CalibrationService::new(runner, Arc::new(UuidProvider), config)
}

/// First interrupt stops new launches; returns true when a second one arrives
///
/// Running children are not killed on the way out. Returns false if the
/// interrupt source fails before the second interrupt.
async fn watch_interrupts<F, Fut>(mut interrupt: F, shutdown_tx: ShutdownSender) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupt received: finishing running jobs, launching no more; interrupt again to exit");
    shutdown_tx.shutdown();

    if interrupt().await.is_err() {
        return false;
    }
    error!("Second interrupt: exiting without waiting for running jobs");
    true
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging = logging::init_from_env()?;
    info!(version = calib_core::VERSION, "calib starting");

    match &cli.command {
        Commands::List => {
            let catalog = CalibratorCatalog::builtin();
            if cli.json {
                print_json(&catalog.specs().collect::<Vec<_>>())?;
            } else {
                report::print_catalog(catalog.specs());
            }
        }

        Commands::Run {
            calibrator,
            params,
            switches,
            lists,
            label,
            output_prefix,
            keep_artifact,
        } => {
            let request = run_request(
                calibrator.clone(),
                params.clone(),
                switches.clone(),
                lists.clone(),
                label.clone(),
                output_prefix.clone(),
                *keep_artifact,
            );
            let toolchain = ToolchainConfig::from_env();
            let calibrator = request.configure(&CalibratorCatalog::builtin(), &toolchain)?;

            let result = service(&cli, SchedulerConfig::default())
                .calibrate(&calibrator)
                .await?;

            if cli.json {
                print_json(&result)?;
            } else {
                report::print_result(&result);
            }
        }

        Commands::Batch {
            manifest,
            max_concurrency,
            poll_interval_ms,
        } => {
            let manifest = BatchManifest::load(manifest)
                .with_context(|| format!("Cannot read manifest {}", manifest.display()))?;
            let config = manifest.scheduler_config(*max_concurrency, *poll_interval_ms)?;
            let toolchain = ToolchainConfig::from_env();
            let calibrators = manifest.calibrators(CalibratorCatalog::builtin(), &toolchain)?;

            let (shutdown_tx, shutdown_token) = shutdown_channel();
            tokio::spawn(async move {
                if watch_interrupts(tokio::signal::ctrl_c, shutdown_tx).await {
                    std::process::exit(FORCED_EXIT_CODE);
                }
            });

            let batch = service(&cli, config)
                .calibrate_batch(calibrators, Some(shutdown_token))
                .await?;

            if cli.json {
                print_json(&batch)?;
            } else {
                report::print_batch(&batch);
            }

            let report = &batch.report;
            if !report.all_succeeded() {
                bail!(
                    "{} of {} jobs did not succeed",
                    report.failed().count() + report.not_launched().len(),
                    report.len() + report.not_launched().len()
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Interrupt = std::pin::Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>;

    /// Interrupt source fired by `notify_one`
    fn notify_source(notify: &Arc<Notify>) -> impl FnMut() -> Interrupt {
        let notify = Arc::clone(notify);
        move || {
            let notify = Arc::clone(&notify);
            Box::pin(async move {
                notify.notified().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_second_interrupt_requests_exit() {
        let notify = Arc::new(Notify::new());
        let (tx, mut token) = shutdown_channel();
        let watcher = tokio::spawn(watch_interrupts(notify_source(&notify), tx));

        notify.notify_one();
        tokio::time::timeout(Duration::from_secs(1), token.wait())
            .await
            .unwrap();
        assert!(token.is_shutdown());
        assert!(!watcher.is_finished());

        notify.notify_one();
        let forced = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
        assert!(forced);
    }

    #[tokio::test]
    async fn test_failed_interrupt_source_never_exits() {
        let (tx, token) = shutdown_channel();
        let forced = watch_interrupts(
            || async { Err(std::io::Error::other("no handler")) },
            tx,
        )
        .await;
        assert!(!forced);
        assert!(!token.is_shutdown());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("photon-energy=20").unwrap(),
            ("photon-energy".to_string(), "20".to_string())
        );
        assert_eq!(
            parse_key_value("pattern=a=b").unwrap(),
            ("pattern".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=5").is_err());
    }

    #[test]
    fn test_run_request_configures_soft_comp() {
        let request = run_request(
            "pandora-soft-comp".to_string(),
            vec![("root-file-pattern".to_string(), "k_%energy%.root".to_string())],
            vec!["cluster-energy".to_string()],
            vec![("energies".to_string(), "10, 20,50".to_string())],
            None,
            Some("/tmp/sc_".to_string()),
            true,
        );
        let toolchain = ToolchainConfig::default().with_analysis_root("/opt/pandora");
        let calibrator = request
            .configure(&CalibratorCatalog::builtin(), &toolchain)
            .unwrap();

        let job = calibrator.build_job("job-1").unwrap();
        assert_eq!(
            job.command_args(),
            vec!["-e", "10:20:50", "-f", "k_%energy%.root", "-g", "-d", "/tmp/sc_"]
        );
        assert!(!job.deletes_artifact());
    }

    #[test]
    fn test_cli_parses_batch_flags() {
        let cli = Cli::try_parse_from([
            "calib",
            "batch",
            "jobs.json",
            "--max-concurrency",
            "4",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Batch {
                max_concurrency, ..
            } => assert_eq!(max_concurrency, Some(4)),
            _ => panic!("expected batch"),
        }
    }
}
