use chrono::{DateTime, Utc};
use thiserror::Error;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("index is empty")]
    EmptyIndex,
    #[error("no frame at or after {start}")]
    NoStartFrame { start: DateTime<Utc> },
    #[error("window ends at {end}, before the first frame at {first}")]
    EndBeforeFirstFrame {
        end: DateTime<Utc>,
        first: DateTime<Utc>,
    },
    #[error("window covers no frame (start index {start_index} > end index {end_index})")]
    EmptyRange { start_index: usize, end_index: usize },
}

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mux step exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl MuxError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no data for camera '{camera}' in {start} .. {end}")]
    NoData {
        camera: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("frame range resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("mux step failed: {0}")]
    Mux(#[from] MuxError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// "Nichts aufgenommen" ist kein Fehler im eigentlichen Sinn.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("connection i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("message of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("payload is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or empty field '{0}'")]
    MissingField(&'static str),
    #[error("unparsable timestamp '{0}'")]
    BadTimestamp(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("scheduler full ({pending} events pending)")]
pub struct SchedulerFull {
    pub pending: usize,
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection service i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("detection service sent invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("detection service error: {0}")]
    Remote(String),
}
