//! ingestcheck - log ingestion completeness verifier CLI
//!
//! ## Commands
//!
//! - `verify`: wait for every producer's lines to show up and judge loss,
//!   agent restarts and agent placement
//! - `generate`: run the configured producers locally
//! - `agents`: check agent restarts and placement only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use ingestcheck_core::{
    AgentHealthChecker, Clock, DirLogSource, FileLogProducer, JsonInventory, ProducerRecord,
    TokioClock, VerificationConfig, VerificationReport, Verifier,
};

#[derive(Parser)]
#[command(name = "ingestcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Log ingestion completeness verifier", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify that every producer's lines were ingested
    Verify {
        /// Verification config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding one `<producer>.log` file per producer
        #[arg(long)]
        logs_dir: PathBuf,

        /// Inventory snapshot of nodes and agent instances (JSON)
        #[arg(long)]
        inventory: PathBuf,

        /// Override the ingestion timeout
        #[arg(long, env = "INGESTCHECK_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,

        /// Override the pause between polling rounds
        #[arg(long, env = "INGESTCHECK_POLL_INTERVAL_SECS")]
        poll_interval_secs: Option<u64>,

        /// Override the tolerated lost fraction (0.0 - 1.0)
        #[arg(long, env = "INGESTCHECK_MAX_LOST_FRACTION")]
        max_lost_fraction: Option<f64>,

        /// Override the tolerated restarts per agent instance
        #[arg(long, env = "INGESTCHECK_MAX_AGENT_RESTARTS")]
        max_agent_restarts: Option<u32>,

        /// Write the full report as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Start the configured producers locally before verifying
        #[arg(long)]
        start: bool,
    },

    /// Run the configured producers locally and wait for them to finish
    Generate {
        /// Verification config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Directory the producers write into
        #[arg(long)]
        logs_dir: PathBuf,
    },

    /// Check agent restarts and placement only
    Agents {
        /// Inventory snapshot of nodes and agent instances (JSON)
        #[arg(long)]
        inventory: PathBuf,

        /// Agent application name
        #[arg(long, default_value = ingestcheck_core::config::DEFAULT_AGENT_APP_NAME)]
        app: String,

        /// Tolerated restarts per agent instance
        #[arg(long, default_value = "0")]
        max_restarts: u32,
    },
}

/// Values that take precedence over the config file.
#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    max_lost_fraction: Option<f64>,
    max_agent_restarts: Option<u32>,
}

impl Overrides {
    fn apply(self, mut config: VerificationConfig) -> Result<VerificationConfig> {
        if let Some(secs) = self.timeout_secs {
            config.ingestion_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(fraction) = self.max_lost_fraction {
            config.max_allowed_lost_fraction = fraction;
        }
        if let Some(restarts) = self.max_agent_restarts {
            config.max_allowed_agent_restarts = restarts;
        }
        config
            .validate()
            .context("Invalid configuration after overrides")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    ingestcheck_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Verify {
            config,
            logs_dir,
            inventory,
            timeout_secs,
            poll_interval_secs,
            max_lost_fraction,
            max_agent_restarts,
            report_json,
            start,
        } => {
            let overrides = Overrides {
                timeout_secs,
                poll_interval_secs,
                max_lost_fraction,
                max_agent_restarts,
            };
            cmd_verify(
                &config,
                &logs_dir,
                &inventory,
                overrides,
                report_json.as_deref(),
                start,
                Arc::new(TokioClock),
            )
            .await
        }
        Commands::Generate { config, logs_dir } => cmd_generate(&config, &logs_dir).await,
        Commands::Agents {
            inventory,
            app,
            max_restarts,
        } => cmd_agents(&inventory, &app, max_restarts).await,
    }
}

fn load_config(path: &Path) -> Result<VerificationConfig> {
    VerificationConfig::from_json_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn cmd_verify(
    config_path: &Path,
    logs_dir: &Path,
    inventory_path: &Path,
    overrides: Overrides,
    report_json: Option<&Path>,
    start: bool,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    let config = overrides.apply(load_config(config_path)?)?;

    let source = Arc::new(DirLogSource::new(logs_dir, config.agent_app_name.clone()));
    let inventory = Arc::new(JsonInventory::new(inventory_path));
    let verifier = Verifier::new(source, inventory).with_clock(clock);

    println!("Verifying {} producer(s)", config.producers.len());
    println!("Expected lines: {}", config.total_expected_lines());
    println!("Timeout: {}s", config.ingestion_timeout.as_secs_f64());
    println!();

    let report = if start {
        let producer = FileLogProducer::new(logs_dir);
        let report = verifier
            .start_and_run(&producer, &config)
            .await
            .context("Verification run failed")?;
        producer
            .wait_all()
            .await
            .context("Producer failed while writing")?;
        report
    } else {
        verifier
            .run(&config)
            .await
            .context("Verification run failed")?
    };

    if let Some(path) = report_json {
        write_report(&report, path)?;
        info!(path = %path.display(), "Report written");
    }

    println!("{}", report.render_text());

    if report.exit_ok() {
        println!("\n✓ All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("Ingestion verification failed")
    }
}

fn write_report(report: &VerificationReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

async fn cmd_generate(config_path: &Path, logs_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let producer = FileLogProducer::new(logs_dir);

    let records = ingestcheck_core::start_producers(&producer, &config.producers)
        .await
        .context("Failed to start producers")?;

    let longest = records
        .iter()
        .map(ProducerRecord::run_duration)
        .max()
        .unwrap_or(Duration::ZERO);
    println!(
        "Started {} producer(s) writing into {} (up to {}s)",
        records.len(),
        logs_dir.display(),
        longest.as_secs_f64()
    );

    producer
        .wait_all()
        .await
        .context("Producer failed while writing")?;

    for record in &records {
        println!("  ✓ {} ({} lines)", record.name(), record.expected_lines());
    }
    Ok(())
}

async fn cmd_agents(inventory_path: &Path, app: &str, max_restarts: u32) -> Result<()> {
    let checker = AgentHealthChecker::new(Arc::new(JsonInventory::new(inventory_path)), app);

    let summary = checker
        .observe_restarts()
        .await
        .context("Failed to get agent instances")?;

    println!("Agents ({}): {} instance(s)", app, summary.observations.len());
    for agent in &summary.observations {
        println!(
            "  {} on {} ({} restart(s))",
            agent.name, agent.node, agent.restart_count
        );
    }

    let restarts = summary.verdict(max_restarts);
    println!(
        "Restarts: {}",
        if restarts.is_ok() { "✓ PASSED" } else { "✗ FAILED" }
    );
    if let Err(e) = &restarts {
        println!("  - {}", e);
    }

    let violations = checker
        .placement_violations()
        .await
        .context("Failed to check agent placement")?;
    println!(
        "Placement: {}",
        if violations.is_empty() { "✓ PASSED" } else { "✗ FAILED" }
    );
    for violation in &violations {
        println!("  - {}", violation);
    }

    if restarts.is_ok() && violations.is_empty() {
        println!("\n✓ All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("Agent checks failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestcheck_core::fakes::ManualClock;

    fn write_fixture(dir: &Path, restarts: u32) -> (PathBuf, PathBuf) {
        let config = dir.join("config.json");
        std::fs::write(
            &config,
            r#"{
                "producers": [
                    {"name": "p0", "expected_lines": 20, "run_duration_secs": 0},
                    {"name": "p1", "placement": "n1", "expected_lines": 10, "run_duration_secs": 0}
                ],
                "ingestion_timeout_secs": 5,
                "poll_interval_secs": 1,
                "max_allowed_lost_fraction": 0.0,
                "max_allowed_agent_restarts": 1,
                "agent_app_name": "fluentd"
            }"#,
        )
        .unwrap();

        let inventory = dir.join("inventory.json");
        std::fs::write(
            &inventory,
            format!(
                r#"{{
                    "nodes": ["n1"],
                    "agents": [
                        {{"name": "fluentd-1", "app": "fluentd", "node": "n1", "restart_count": {restarts}}}
                    ]
                }}"#
            ),
        )
        .unwrap();
        (config, inventory)
    }

    #[test]
    fn test_cli_parses_verify_overrides() {
        let cli = Cli::try_parse_from([
            "ingestcheck",
            "verify",
            "--config",
            "c.json",
            "--logs-dir",
            "logs",
            "--inventory",
            "inv.json",
            "--max-lost-fraction",
            "0.05",
            "--start",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify {
                max_lost_fraction,
                start,
                ..
            } => {
                assert_eq!(max_lost_fraction, Some(0.05));
                assert!(start);
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_overrides_take_precedence_and_revalidate() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, _) = write_fixture(dir.path(), 0);
        let config = load_config(&config_path).unwrap();

        let applied = Overrides {
            timeout_secs: Some(60),
            max_agent_restarts: Some(4),
            ..Overrides::default()
        }
        .apply(config.clone())
        .unwrap();
        assert_eq!(applied.ingestion_timeout, Duration::from_secs(60));
        assert_eq!(applied.max_allowed_agent_restarts, 4);
        assert_eq!(applied.poll_interval, Duration::from_secs(1));

        let invalid = Overrides {
            max_lost_fraction: Some(1.5),
            ..Overrides::default()
        }
        .apply(config);
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_verify_with_local_start_passes_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let (config, inventory) = write_fixture(dir.path(), 0);
        let logs = dir.path().join("logs");
        let report_path = dir.path().join("report.json");

        // writers run on real I/O; a generous virtual deadline bounds the rounds
        let overrides = Overrides {
            timeout_secs: Some(3600),
            ..Overrides::default()
        };
        cmd_verify(
            &config,
            &logs,
            &inventory,
            overrides,
            Some(&report_path),
            true,
            Arc::new(ManualClock::new()),
        )
        .await
        .unwrap();

        let written = std::fs::read_to_string(logs.join("p0.log")).unwrap();
        assert_eq!(written.lines().count(), 20);

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["passed"], true);
        assert_eq!(report["total_missing"], 0);
    }

    #[tokio::test]
    async fn test_generate_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let (config, inventory) = write_fixture(dir.path(), 0);
        let logs = dir.path().join("logs");

        cmd_generate(&config, &logs).await.unwrap();
        assert!(logs.join("p0.log").exists());

        cmd_verify(
            &config,
            &logs,
            &inventory,
            Overrides::default(),
            None,
            false,
            Arc::new(ManualClock::new()),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_verify_start_surfaces_writer_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (config, inventory) = write_fixture(dir.path(), 0);
        let logs = dir.path().join("logs");
        // a directory where p0's log file should go makes its writer fail
        std::fs::create_dir_all(logs.join("p0.log")).unwrap();

        let err = cmd_verify(
            &config,
            &logs,
            &inventory,
            Overrides::default(),
            None,
            true,
            Arc::new(ManualClock::new()),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("Producer failed"), "{err:#}");
    }

    #[tokio::test]
    async fn test_agents_fails_on_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let (_, inventory) = write_fixture(dir.path(), 3);

        assert!(cmd_agents(&inventory, "fluentd", 5).await.is_ok());
        assert!(cmd_agents(&inventory, "fluentd", 2).await.is_err());
        // no instance of another app runs on n1
        assert!(cmd_agents(&inventory, "other", 5).await.is_err());
    }
}
