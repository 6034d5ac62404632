use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alphamill::artifact::ArtifactLoader;
use alphamill::collaborator::collaborator_for;
use alphamill::config::{DEFAULT_NUM_VARIATIONS, SeedTask, Settings};
use alphamill::data::load_data;
use alphamill::ledger::LedgerRecorder;
use alphamill::orchestrator::MiningPipeline;
use alphamill::runner::FactorRunner;
use alphamill::script::ScriptHost;

#[derive(Parser)]
#[command(name = "alphamill")]
#[command(version, about = "LLM-driven factor mining pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file. Defaults to alphamill.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mine factors for the configured tasks, or one ad-hoc idea
    Run {
        /// Provider label; defaults to the configured active provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Seed idea to mine instead of the configured tasks
        #[arg(long)]
        idea: Option<String>,

        /// Variants to request per seed idea
        #[arg(long, default_value_t = DEFAULT_NUM_VARIATIONS)]
        variations: usize,
    },
    /// List configured providers
    Providers,
    /// List configured seed tasks
    Tasks,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            provider,
            idea,
            variations,
        } => {
            cmd_run(&settings, provider.as_deref(), idea.as_deref(), *variations).await?;
        }
        Commands::Providers => cmd_providers(&settings),
        Commands::Tasks => cmd_tasks(&settings),
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "alphamill=debug"
    } else {
        "alphamill=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_run(
    settings: &Settings,
    provider: Option<&str>,
    idea: Option<&str>,
    variations: usize,
) -> Result<()> {
    let label = provider.unwrap_or(&settings.active_provider);
    if settings.profile(label).is_none() {
        bail!(
            "unknown provider '{label}' (configured: {})",
            settings.provider_labels().join(", ")
        );
    }

    let paths = settings.paths_for(label);
    paths.ensure_directories()?;

    let data = load_data(&settings.data.panel, &settings.data.index)?;
    let collaborator = collaborator_for(label, settings)?;
    let recorder = LedgerRecorder::create(&paths.records_dir)?;
    let ledger_path = recorder.path().display().to_string();

    let loader = ArtifactLoader::new(ScriptHost::new(), &paths.codes_dir);
    let runner = FactorRunner::new(data, &paths.factors_dir);
    let mut pipeline =
        MiningPipeline::new(collaborator, loader, runner, recorder, settings.max_retries);

    let tasks: Vec<SeedTask> = match idea {
        Some(idea) => vec![SeedTask {
            idea: idea.to_string(),
            variations,
        }],
        None => settings.tasks.clone(),
    };

    info!(provider = label, tasks = tasks.len(), "starting mining run");
    let summary = pipeline.run(&tasks).await?;
    println!("{summary}");
    println!("Audit ledger: {ledger_path}");
    Ok(())
}

fn cmd_providers(settings: &Settings) {
    for (label, profile) in &settings.providers {
        let marker = if *label == settings.active_provider {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {label}  ideation={}  coding={}  key_env={}",
            profile.ideation_model, profile.coding_model, profile.api_key_env
        );
    }
}

fn cmd_tasks(settings: &Settings) {
    if settings.tasks.is_empty() {
        println!("No tasks configured.");
        return;
    }
    for task in &settings.tasks {
        println!("[{} variations] {}", task.variations, task.idea);
    }
}
