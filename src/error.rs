//! Error types for loading, filtering and naming annotation data

use std::path::PathBuf;
use thiserror::Error;

use crate::payload::EventId;

pub type Result<T> = std::result::Result<T, VizError>;

#[derive(Error, Debug)]
pub enum VizError {
    /// A selection refers to a cluster that does not exist
    #[error("Invalid cluster index {index}: only {len} clusters available")]
    InvalidClusterIndex { index: usize, len: usize },

    /// A payload is missing its event sequence or has malformed records
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Cluster naming hit an event with no known surface string
    #[error("Missing surface form for event {0}")]
    MissingSurfaceForm(EventId),

    #[error("No corpus configured")]
    NoCorpus,

    #[error("Unknown corpus: {0}")]
    UnknownCorpus(String),

    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("Failed to read {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
