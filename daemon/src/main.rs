//! trustgate: offline tooling for the verification engine.

mod scenario;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use trustgate_utils::LogFormat;
use trustgate_verification::{classify, Decision, EngineConfig};

use scenario::{Replay, Scenario};

#[derive(Parser)]
#[command(name = "trustgate", about = "Trust verification engine tooling")]
struct Cli {
    /// Path to a TOML engine configuration. Without one the built-in defaults apply.
    #[arg(long, global = true, env = "TRUSTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    /// Overrides the `[logging]` section of the config file.
    #[arg(long, global = true, env = "TRUSTGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, global = true, env = "TRUSTGATE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Inspect engine configuration.
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Classify a confidence score against the configured borderline band.
    Classify {
        #[arg(long)]
        score: u32,
    },
    /// Replay a scripted scenario and print each step's events as JSON lines.
    Replay {
        scenario: PathBuf,
        /// Print one pretty JSON document instead of JSON lines.
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the default configuration as TOML.
    Defaults,
    /// Load and validate a configuration file.
    Check { file: PathBuf },
}

#[derive(Serialize)]
struct Classification {
    score: u32,
    decision: Decision,
    lower_threshold: u32,
    upper_threshold: u32,
    escalation_enabled: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => {
            let config = EngineConfig::from_toml_file(path)
                .with_context(|| format!("invalid config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(EngineConfig::defaults()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Command::Config {
            action: ConfigAction::Check { file },
        } => Some(file.as_path()),
        _ => cli.config.as_deref(),
    };
    let config = load_config(config_path)?;

    let format = cli
        .log_format
        .as_deref()
        .map(LogFormat::parse)
        .unwrap_or(config.logging.format);
    let level = cli.log_level.as_deref().unwrap_or(config.logging.level.as_str());
    trustgate_utils::init_logging(format, level);
    if let Some(path) = config_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Defaults => {
                print!("{}", EngineConfig::defaults().to_toml_string()?);
            }
            ConfigAction::Check { file } => {
                println!("{}: ok", file.display());
            }
        },
        Command::Classify { score } => {
            let band = &config.borderline;
            anyhow::ensure!(
                score <= trustgate_types::MAX_SCORE,
                "score {score} out of range 0..={}",
                trustgate_types::MAX_SCORE
            );
            let mut decision = classify(band, score);
            if decision == Decision::Escalate && !band.enabled {
                decision = Decision::Reject;
            }
            let out = Classification {
                score,
                decision,
                lower_threshold: band.lower_threshold,
                upper_threshold: band.upper_threshold,
                escalation_enabled: band.enabled,
            };
            println!("{}", serde_json::to_string(&out)?);
        }
        Command::Replay { scenario, pretty } => {
            let script = Scenario::from_toml_file(&scenario)?;
            tracing::info!(
                steps = script.steps.len(),
                start = script.start,
                "replaying {}",
                scenario.display()
            );
            let mut replay = Replay::new(&config, script.start)?;
            let reports = replay.run(&script);
            if pretty {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    println!("{}", serde_json::to_string(report)?);
                }
            }
            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            tracing::info!(steps = reports.len(), failed, "replay finished");
        }
    }

    Ok(())
}
