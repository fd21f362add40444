use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::model::ForecastKind;

/// Terminal error of an ingestion run or a read of the stored snapshot.
///
/// Every stage fails fast: the first error encountered ends the run and is
/// returned to the trigger. Only `NoForecastAvailable` describes a normal
/// state (nothing ingested yet); see [`ForecastError::is_not_ready`].
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Startup-time configuration defect, e.g. a location no model covers.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch failed")]
    FetchFailed(#[from] FetchError),

    #[error("parse failed for model {model}")]
    ParseFailed {
        model: String,
        #[source]
        cause: ParseError,
    },

    #[error("assembly failed")]
    AssemblyFailed(#[from] AssemblyError),

    #[error("snapshot store failed")]
    StoreFailed(#[from] StoreError),

    #[error("no {0} forecast available yet")]
    NoForecastAvailable(ForecastKind),

    #[error("an ingestion run for the {0} forecast is already in progress")]
    IngestInProgress(ForecastKind),
}

impl ForecastError {
    /// True when the error only means "nothing has been ingested yet".
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ForecastError::NoForecastAvailable(_))
    }
}

/// Render an error and its causes on one line, outermost first.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut cause = err.source();
    while let Some(e) = cause {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cause = e.source();
    }
    out
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} could not be completed")]
    Transport {
        url: String,
        #[source]
        cause: reqwest::Error,
    },

    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("upstream returned an error document: {0}")]
    Upstream(String),

    #[error("malformed payload at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("payload truncated: variable {variable} has {found} steps, time axis has {expected}")]
    Truncated {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("variable {0} missing from payload")]
    MissingVariable(String),

    #[error("payload contained no usable samples")]
    Empty,
}

#[derive(Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("no hours common to all series ({wave} wave samples, {wind} wind samples)")]
    NoAlignedHours { wave: usize, wind: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("could not encode forecast")]
    Encode(#[source] serde_json::Error),

    #[error("stored forecast at {path} is unreadable")]
    Corrupt {
        path: PathBuf,
        #[source]
        cause: serde_json::Error,
    },

    #[error("snapshot store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            cause,
        }
    }
}
