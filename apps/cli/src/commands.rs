//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use roofscout_core::{PipelineController, ScanStats};
use roofscout_provider::GeminiClient;
use roofscout_shared::{
    AppConfig, PipelineConfig, ProgressSnapshot, Region, RunStatus, init_config, load_config,
    resolve_api_key,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RoofScout: commercial roof lead discovery.
#[derive(Parser)]
#[command(
    name = "roofscout",
    version,
    about = "Discover commercial properties and estimate roof condition for outreach.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Scan a region and export enriched leads as CSV.
    Scan {
        /// City to scan (defaults to `defaults.city`).
        #[arg(long)]
        city: Option<String>,

        /// State to scan (defaults to `defaults.state`).
        #[arg(long)]
        state: Option<String>,

        /// Output directory for the CSV (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Seed for backoff jitter and placeholder coordinates.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "roofscout=info",
        1 => "roofscout=debug",
        _ => "roofscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan {
            city,
            state,
            out,
            seed,
        } => cmd_scan(city, state, out, seed).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Apply `--city`/`--state` over the configured defaults.
fn resolve_region(config: &AppConfig, city: Option<String>, state: Option<String>) -> Region {
    let defaults = config.defaults.region();
    Region::new(
        city.unwrap_or(defaults.city),
        state.unwrap_or(defaults.state),
    )
}

async fn cmd_scan(
    city: Option<String>,
    state: Option<String>,
    out: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<()> {
    // Validate API key before doing anything
    let config = load_config()?;
    let api_key = resolve_api_key(&config)?;

    let region = resolve_region(&config, city, state);
    let out_dir = out.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));

    let client = Arc::new(
        GeminiClient::new(api_key, &config.gemini)?.with_retrieval_origin(&config.origin),
    );
    let pipeline_config = PipelineConfig::from(&config);
    let controller = match seed {
        Some(seed) => {
            PipelineController::with_seed(client.clone(), client, pipeline_config, seed)
        }
        None => PipelineController::new(client.clone(), client, pipeline_config),
    };

    info!(%region, out = %out_dir.display(), "starting scan");

    let progress = CliProgress::spawn(controller.subscribe())?;
    let result = controller.run(&region).await;
    let final_snapshot = controller.snapshot();
    // Closes the snapshot channel so the bar stops even if the run was rejected.
    drop(controller);
    progress.finish().await;

    let outcome = result.wrap_err_with(|| final_snapshot.message.clone())?;

    println!();
    println!("  {}", final_snapshot.message);

    if outcome.status == RunStatus::Idle {
        println!();
        return Ok(());
    }

    let stats = ScanStats::from_leads(&outcome.leads);
    let path = roofscout_export::write_csv(&out_dir, &region, &outcome.leads)?;

    println!("  Region:        {region}");
    println!("  Leads:         {}", stats.total);
    println!("  Avg. sq ft:    {}", stats.average_sq_ft);
    println!("  High priority: {} (Poor {}, Fair {})", stats.high_priority, stats.poor, stats.fair);
    println!("  Good/Excellent: {}/{}", stats.good, stats.excellent);
    if outcome.failed > 0 {
        println!("  Unanalyzed:    {}", outcome.failed);
    }
    println!("  CSV:           {}", path.display());
    println!("  Time:          {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress bar that follows the controller's snapshot channel.
struct CliProgress {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl CliProgress {
    fn spawn(mut rx: watch::Receiver<ProgressSnapshot>) -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));

        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                task_bar.set_length(snapshot.total as u64);
                task_bar.set_position(snapshot.current as u64);
                task_bar.set_message(snapshot.message);
                // Every published snapshot follows a run start, so an inactive one is terminal.
                if !snapshot.status.is_active() {
                    break;
                }
            }
        });

        Ok(Self { bar, task })
    }

    async fn finish(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "progress display task failed");
        }
        self.bar.finish_and_clear();
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_flags_parse() {
        let cli = Cli::parse_from([
            "roofscout", "-vv", "scan", "--city", "Erie", "--state", "PA", "--seed", "7",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Scan { city, state, seed, out } => {
                assert_eq!(city.as_deref(), Some("Erie"));
                assert_eq!(state.as_deref(), Some("PA"));
                assert_eq!(seed, Some(7));
                assert!(out.is_none());
            }
            Command::Config { .. } => panic!("expected scan"),
        }
    }

    #[tokio::test]
    async fn progress_stops_at_terminal_snapshot() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let progress = CliProgress::spawn(rx).expect("progress style");

        tx.send_modify(|s| s.status = RunStatus::Searching);
        tx.send_modify(|s| {
            s.status = RunStatus::Completed;
            s.total = 2;
            s.current = 2;
        });

        // The sender is still alive, so only the terminal status can end the task.
        tokio::time::timeout(std::time::Duration::from_secs(5), progress.finish())
            .await
            .expect("progress task should end on a terminal snapshot");
        drop(tx);
    }

    #[tokio::test]
    async fn panicked_progress_task_does_not_propagate() {
        let progress = CliProgress {
            bar: ProgressBar::hidden(),
            task: tokio::spawn(async { panic!("render failed") }),
        };

        progress.finish().await;
    }

    #[test]
    fn region_falls_back_to_defaults() {
        let config = AppConfig::default();
        assert_eq!(resolve_region(&config, None, None), Region::new("Pittsburgh", "PA"));
        assert_eq!(
            resolve_region(&config, Some("Erie".into()), None),
            Region::new("Erie", "PA")
        );
    }
}
