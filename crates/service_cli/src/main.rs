//! mlmc-var - Command Line Operations for Multilevel Monte Carlo VaR
//!
//! This is the operational entry point for the MLMC Value-at-Risk library.
//!
//! # Commands
//!
//! - `mlmc-var run` - Estimate VaR and Expected Shortfall for the configured model
//! - `mlmc-var check` - Validate the configuration and print the level schedule
//! - `mlmc-var closed-form` - Exact figures for single-factor linear portfolios
//! - `mlmc-var calibrate` - Fit GBM factors to historical prices
//!
//! # Architecture
//!
//! As part of the **S**ervice layer, this crate reads a TOML run description,
//! builds the loss model from `mlmc_pricing` and drives the estimator in
//! `mlmc_risk`. Logs go to stderr so that results on stdout stay parseable.

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;
mod error;

use commands::calibrate::Period;
use config::{OutputFormat, Overrides, RunConfig, DEFAULT_CONFIG_PATH};
pub use error::{CliError, Result};

/// Multilevel Monte Carlo Value-at-Risk CLI
#[derive(Parser)]
#[command(name = "mlmc-var")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate VaR and Expected Shortfall with the multilevel estimator
    Run {
        /// Base seed of the sample streams
        #[arg(short, long)]
        seed: Option<u64>,

        /// Target mean squared error eps^2
        #[arg(short, long)]
        target_mse: Option<f64>,

        /// VaR confidence level (e.g. 0.99)
        #[arg(short = 'a', long)]
        confidence: Option<f64>,

        /// Worker threads (default: all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate the configuration and print the level schedule
    Check,

    /// Exact VaR and ES for a linear portfolio on one GBM factor
    ClosedForm {
        /// VaR confidence level (e.g. 0.99)
        #[arg(short = 'a', long)]
        confidence: Option<f64>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Fit GBM volatilities and correlations to historical prices
    Calibrate {
        /// CSV of prices, one column per asset
        #[arg(short, long)]
        market_data: String,

        /// Return period of the volatility estimate
        #[arg(short, long, value_enum, default_value_t)]
        period: Period,

        /// Annual drift, one for all assets or one per column
        #[arg(short, long, value_delimiter = ',')]
        drift: Vec<f64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialise tracing; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config;
    let load = || {
        debug!(config = %config_path, "Loading configuration");
        RunConfig::load(&config_path)
    };

    match cli.command {
        Commands::Run {
            seed,
            target_mse,
            confidence,
            workers,
            format,
            output,
        } => {
            let config = load()?.with_overrides(Overrides {
                seed,
                target_mse,
                confidence_level: confidence,
                workers,
                format,
            });
            commands::run::run(&config, output.as_deref())
        }
        Commands::Check => commands::check::run(&load()?),
        Commands::ClosedForm {
            confidence,
            format,
            output,
        } => {
            let config = load()?.with_overrides(Overrides {
                confidence_level: confidence,
                format,
                ..Overrides::default()
            });
            commands::closed_form::run(&config, output.as_deref())
        }
        Commands::Calibrate {
            market_data,
            period,
            drift,
            format,
            output,
        } => commands::calibrate::run(&market_data, period, &drift, format, output.as_deref()),
    }
}
