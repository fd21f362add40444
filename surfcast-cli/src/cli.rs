use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Select};
use std::{path::PathBuf, sync::Arc};

use surfcast_core::{
    Config, DodsAsciiParser, FileSnapshotStore, Forecast, ForecastKind, HttpFetcher, IngestPipeline,
    ModelFamily, ModelRegistry, SnapshotStore, UnitSystem, UpsertOutcome,
};

use crate::display;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "surfcast", version, about = "Surf forecast ingestion and viewer")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "surfcast_core=debug". RUST_LOG wins if set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the latest model run and replace the stored forecast.
    Fetch {
        #[arg(long, default_value = "surf", value_parser = parse_kind)]
        kind: ForecastKind,
    },

    /// Print the stored forecast as a table.
    Show {
        #[arg(long, default_value = "surf", value_parser = parse_kind)]
        kind: ForecastKind,

        /// Only print the first N forecast hours.
        #[arg(long)]
        hours: Option<usize>,
    },

    /// Print the stored forecast as JSON.
    Json {
        #[arg(long, default_value = "surf", value_parser = parse_kind)]
        kind: ForecastKind,
    },

    /// Interactively edit units, timeouts and beach parameters.
    Configure,

    /// List the configured points and the model serving each.
    Locations,
}

fn parse_kind(value: &str) -> Result<ForecastKind, String> {
    ForecastKind::try_from(value).map_err(|e| e.to_string())
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        tracing::debug!(units = %config.units, concurrent = config.fetch.concurrent, "Loaded configuration");

        match self.command {
            Command::Fetch { kind } => {
                let store = Arc::new(FileSnapshotStore::new(config.snapshot_dir()?));
                let pipeline = IngestPipeline::new(
                    &config,
                    &ModelRegistry::default(),
                    Arc::new(HttpFetcher::new()),
                    Arc::new(DodsAsciiParser),
                    store,
                )?;

                let report = pipeline.run(kind, Utc::now()).await?;
                let action = match report.outcome {
                    UpsertOutcome::Created { .. } => "Created",
                    UpsertOutcome::Replaced { .. } => "Replaced",
                };
                println!(
                    "{action} {kind} forecast: {} hours from the {} run.",
                    report.records,
                    report.model_run.format("%Y-%m-%d %Hz"),
                );
            }
            Command::Show { kind, hours } => {
                let store = FileSnapshotStore::new(config.snapshot_dir()?);
                match stored_forecast(&store, kind)? {
                    Some(forecast) => print!("{}", display::render_table(&forecast, hours)),
                    None => println!("{}", not_ready_message(kind)),
                }
            }
            Command::Json { kind } => {
                let store = FileSnapshotStore::new(config.snapshot_dir()?);
                match stored_forecast(&store, kind)? {
                    Some(forecast) => {
                        let json = serde_json::to_string_pretty(&forecast)
                            .context("Could not encode forecast as JSON")?;
                        println!("{json}");
                    }
                    None => println!("{}", not_ready_message(kind)),
                }
            }
            Command::Configure => {
                let updated = configure(config)?;
                let path = match &self.config {
                    Some(path) => {
                        updated.save_to(path)?;
                        path.clone()
                    }
                    None => updated.save()?,
                };
                println!("Saved configuration to {}", path.display());
            }
            Command::Locations => {
                let registry = ModelRegistry::default();
                for (role, location) in config.site.locations() {
                    println!(
                        "{role:<9} {:<22} {:>8.3} {:>9.3} {:>6.1} m",
                        location.name(),
                        location.latitude(),
                        location.signed_longitude(),
                        location.elevation(),
                    );
                    for family in ModelFamily::all() {
                        match registry.resolve(location, *family) {
                            Ok(source) => {
                                println!("          {family:<5} {} ({})", source.name, source.description)
                            }
                            Err(e) => println!("          {family:<5} unavailable: {e}"),
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// The stored forecast of `kind`, or `None` before the first ingestion.
fn stored_forecast(
    store: &dyn SnapshotStore,
    kind: ForecastKind,
) -> anyhow::Result<Option<Forecast>> {
    match store.latest(kind) {
        Ok(forecast) => Ok(Some(forecast)),
        Err(e) if e.is_not_ready() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn not_ready_message(kind: ForecastKind) -> String {
    format!("No {kind} forecast available yet. Run `surfcast fetch` first.")
}

fn configure(mut config: Config) -> anyhow::Result<Config> {
    let units = Select::new("Units:", UnitSystem::all().to_vec())
        .with_starting_cursor(UnitSystem::all().iter().position(|u| *u == config.units).unwrap_or(0))
        .prompt()?;
    config.units = units;

    config.fetch.timeout_secs = CustomType::<u64>::new("Per-request timeout (seconds):")
        .with_default(config.fetch.timeout_secs)
        .prompt()?;
    config.fetch.run_budget_secs = CustomType::<u64>::new("Whole-run budget (seconds):")
        .with_default(config.fetch.run_budget_secs)
        .prompt()?;
    config.fetch.concurrent = Confirm::new("Fetch wave and wind at the same time?")
        .with_default(config.fetch.concurrent)
        .prompt()?;

    config.breaking.beach_angle = CustomType::<f64>::new("Beach facing angle (degrees):")
        .with_default(config.breaking.beach_angle)
        .prompt()?;
    config.breaking.beach_slope = CustomType::<f64>::new("Beach slope:")
        .with_default(config.breaking.beach_slope)
        .prompt()?;

    config.validate()?;
    Ok(config)
}
