//! Core library for the `surfcast` forecast service.
//!
//! This crate defines:
//! - Locations and the upstream model sources that serve them
//! - Bounded fetching and parsing of raw model output
//! - Assembly of wave and wind series into a surf forecast
//! - The snapshot store holding the current forecast of each kind
//! - The ingestion pipeline tying these together, and its configuration
//!
//! It is used by `surfcast-cli`, but can also be driven by a scheduler or
//! an HTTP trigger.

pub mod assemble;
pub mod config;
pub mod error;
pub mod fetch;
pub mod location;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod units;

pub use assemble::{Assembler, BreakingParams};
pub use config::Config;
pub use error::{ForecastError, error_chain};
pub use fetch::{HttpFetcher, RawFetcher};
pub use location::{Location, Site};
pub use model::{Forecast, ForecastKind, ForecastRecord};
pub use parser::{DodsAsciiParser, RawParser};
pub use pipeline::{IngestPipeline, IngestReport};
pub use source::{ModelFamily, ModelRegistry, ModelSource};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, UpsertOutcome};
pub use units::UnitSystem;
