//! One ingestion run: resolve, fetch, parse, assemble, store.

use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::Mutex, time::Instant};
use tracing::{error, info, instrument, warn};

use crate::{
    assemble::Assembler,
    config::{Config, FetchConfig, Horizon},
    error::{ForecastError, error_chain},
    fetch::{RawFetcher, fetch_bounded},
    location::Location,
    model::{Forecast, ForecastKind, RawSeries},
    parser::RawParser,
    source::{ModelFamily, ModelRegistry, ModelSource},
    store::{SnapshotStore, UpsertOutcome},
    units::UnitSystem,
};

/// A location paired with the source that serves it.
#[derive(Debug, Clone)]
pub struct Route {
    pub location: Location,
    pub source: ModelSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub kind: ForecastKind,
    pub outcome: UpsertOutcome,
    pub records: usize,
    pub generated_at: DateTime<Utc>,
    pub model_run: DateTime<Utc>,
}

/// The ingestion pipeline, built once at startup.
///
/// Routes are resolved on construction, so a location without a model is
/// reported before any run. Runs of the same kind are mutually exclusive:
/// an overlapping trigger is refused with `IngestInProgress`.
#[derive(Debug)]
pub struct IngestPipeline {
    forecast_location: Location,
    wave: Route,
    wind: Route,
    horizon: Horizon,
    fetch: FetchConfig,
    units: UnitSystem,
    assembler: Assembler,
    fetcher: Arc<dyn RawFetcher>,
    parser: Arc<dyn RawParser>,
    store: Arc<dyn SnapshotStore>,
    guards: HashMap<ForecastKind, Mutex<()>>,
}

impl IngestPipeline {
    pub fn new(
        config: &Config,
        registry: &ModelRegistry,
        fetcher: Arc<dyn RawFetcher>,
        parser: Arc<dyn RawParser>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, ForecastError> {
        let route = |location: &Location, family| -> Result<Route, ForecastError> {
            let source = registry.resolve(location, family)?;
            info!(
                location = %location.name(),
                family = %family,
                model = source.name,
                "resolved model source"
            );
            Ok(Route {
                location: location.clone(),
                source: source.clone(),
            })
        };

        Ok(Self {
            forecast_location: config.site.forecast.clone(),
            wave: route(&config.site.wave, ModelFamily::Wave)?,
            wind: route(&config.site.wind, ModelFamily::Wind)?,
            horizon: config.horizon,
            fetch: config.fetch,
            units: config.units,
            assembler: Assembler::new(config.breaking),
            fetcher,
            parser,
            store,
            guards: ForecastKind::all()
                .iter()
                .map(|k| (*k, Mutex::new(())))
                .collect(),
        })
    }

    pub fn routes(&self) -> [&Route; 2] {
        [&self.wave, &self.wind]
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Read the current forecast of `kind`.
    pub fn latest(&self, kind: ForecastKind) -> Result<Forecast, ForecastError> {
        self.store.latest(kind)
    }

    /// Run one ingestion for `kind`, using `now` to pick the model cycle.
    ///
    /// On any failure the stored snapshot is left as it was.
    #[instrument(skip_all, fields(kind = %kind))]
    pub async fn run(
        &self,
        kind: ForecastKind,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, ForecastError> {
        let Some(_guard) = self.guards.get(&kind).and_then(|m| m.try_lock().ok()) else {
            warn!("ingestion already running, refusing overlapping trigger");
            return Err(ForecastError::IngestInProgress(kind));
        };

        let result = self.ingest(kind, now).await;
        match &result {
            Ok(report) => info!(
                records = report.records,
                key = report.outcome.key(),
                model_run = %report.model_run,
                "ingestion complete"
            ),
            Err(e) => error!(error = %error_chain(e), "ingestion failed"),
        }
        result
    }

    async fn ingest(
        &self,
        kind: ForecastKind,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, ForecastError> {
        let deadline = Instant::now() + self.fetch.run_budget();
        let model_run = self.wave.source.latest_run(now);

        let (wave, wind) = if !kind.needs_wind() {
            (self.fetch_series(&self.wave, now, deadline).await?, None)
        } else if self.fetch.concurrent {
            let (wave, wind) = tokio::join!(
                self.fetch_series(&self.wave, now, deadline),
                self.fetch_series(&self.wind, now, deadline),
            );
            match (wave, wind) {
                (Ok(wave), Ok(wind)) => (wave, Some(wind)),
                (Err(wave_err), Err(wind_err)) => {
                    warn!(error = %error_chain(&wind_err), "wind fetch also failed");
                    return Err(wave_err);
                }
                (Err(e), _) | (_, Err(e)) => return Err(e),
            }
        } else {
            let wave = self.fetch_series(&self.wave, now, deadline).await?;
            let wind = self.fetch_series(&self.wind, now, deadline).await?;
            (wave, Some(wind))
        };

        let forecast = self.assembler.assemble(
            kind,
            self.forecast_location.clone(),
            model_run,
            wave,
            wind,
            self.units,
        )?;

        let outcome = self.store.upsert(kind, &forecast)?;

        Ok(IngestReport {
            kind,
            outcome,
            records: forecast.records.len(),
            generated_at: forecast.generated_at,
            model_run,
        })
    }

    #[instrument(skip_all, fields(model = route.source.name))]
    async fn fetch_series(
        &self,
        route: &Route,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RawSeries, ForecastError> {
        let run = route.source.latest_run(now);
        let url = route.source.create_url(
            &route.location,
            self.horizon.start_hour,
            self.horizon.end_hour,
            run,
        );

        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = self.fetch.timeout().min(remaining);
        let raw = fetch_bounded(self.fetcher.as_ref(), &url, timeout).await?;

        self.parser
            .parse(&raw, &route.location, &route.source)
            .map_err(|cause| ForecastError::ParseFailed {
                model: route.source.name.to_string(),
                cause,
            })
    }
}
