use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use colored::Colorize;

use cosmos_tune::config::{self, FileConfig, Overrides};
use cosmos_tune::logging;
use cosmos_tune::output::OutputWriter;
use cosmos_tune::scenarios::{ScenarioKey, ScenarioRunner, SetupOptions};
use cosmos_tune::shell::{KeySource, LineKeys, TerminalKeys, run_shell};
use cosmos_tune::store::{DocumentStore, StoreBuilder};

#[derive(Parser)]
#[command(name = "cosmos-tune")]
#[command(about = "Cosmos DB performance tuning scenarios")]
struct Cli {
    /// Store backend (cosmos/memory), default cosmos
    #[arg(long)]
    store: Option<String>,

    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Preferred region for reads
    #[arg(long)]
    region: Option<String>,

    /// Backend parameters as key=value, repeatable
    #[arg(long = "connect")]
    connect: Vec<String>,

    /// Dataset to import during setup
    #[arg(long, conflicts_with = "dataset_file")]
    dataset_url: Option<String>,

    /// Local JSON dataset to import during setup
    #[arg(long)]
    dataset_file: Option<PathBuf>,

    /// Generate this many users instead of downloading the dataset
    #[arg(long, conflicts_with_all = ["dataset_url", "dataset_file"])]
    synthetic_users: Option<usize>,

    /// Seed for the synthetic dataset
    #[arg(long)]
    seed: Option<u64>,

    /// Run each read step this many times and summarize latency
    #[arg(long)]
    repeat: Option<u32>,

    /// Optional CSV output file path, one row per step
    #[arg(long)]
    csv: Option<String>,

    /// Run these scenarios in order and exit instead of showing the menu
    #[arg(long = "scenario")]
    scenario: Vec<ScenarioKey>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            store: self.store.clone(),
            region: self.region.clone(),
            connect: self.connect.clone(),
            dataset_url: self.dataset_url.clone(),
            dataset_file: self.dataset_file.clone(),
            synthetic_users: self.synthetic_users,
            seed: self.seed,
            repeat: self.repeat,
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    config::load_dotenv();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = config::resolve(&cli.overrides(), file, |k| std::env::var(k).ok())?;
    tracing::info!(engine = ?settings.engine, dataset = %settings.dataset, "starting");

    let store: Arc<dyn DocumentStore> =
        Arc::from(StoreBuilder::connect(settings.engine, settings.connect).await?);
    let output = match cli.csv {
        Some(path) => OutputWriter::new_csv(path).await?,
        None => OutputWriter::disabled(),
    };
    let setup = SetupOptions {
        dataset: settings.dataset,
    };
    let mut runner = ScenarioRunner::new(store, setup, settings.repeat, output)?;

    if cli.scenario.is_empty() {
        let mut keys: Box<dyn KeySource> = if std::io::stdin().is_terminal() {
            Box::new(TerminalKeys)
        } else {
            Box::new(LineKeys::stdin())
        };
        let summary = run_shell(&mut runner, keys.as_mut()).await?;
        tracing::info!(
            scenarios = summary.scenarios_run.len(),
            failed = summary.scenarios_failed,
            "session ended"
        );
        return Ok(());
    }

    let mut failed = 0;
    for key in cli.scenario {
        let outcome = runner.run(key).await?;
        failed += outcome.failed_steps();
    }
    if failed > 0 {
        bail!("{} step(s) failed", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("cannot initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }
    let interactive = cli.scenario.is_empty();
    let result = run(cli).await;
    if let Err(e) = &result {
        println!("{}", format!("Error: {:#}", e).red());
    }
    if interactive && std::io::stdin().is_terminal() {
        println!("End of demo, press any key to exit.");
        let _ = TerminalKeys.next_key().await;
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
