use std::path::PathBuf;

use thiserror::Error;

/// Which collection of the store an id lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Annotation,
    Image,
    Category,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::Annotation => "annotation",
            RecordKind::Image => "image",
            RecordKind::Category => "category",
        };
        f.write_str(name)
    }
}

/// The main error type for loading, indexing and querying a dataset.
#[derive(Debug, Error)]
pub enum CocoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<CocoError>,
    },

    #[error("{record} is missing required field '{field}'")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record} field '{field}' has the wrong type (expected {expected})")]
    WrongType {
        record: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{record} field '{field}' has an unrecognized shape: {detail}")]
    Shape {
        record: &'static str,
        field: &'static str,
        detail: String,
    },

    #[error("Invalid compressed RLE string: byte {byte:#04x} at offset {offset}")]
    InvalidRleString { offset: usize, byte: u8 },

    #[error("No {kind} with id {id}")]
    MissingId { kind: RecordKind, id: u64 },

    #[error("Results array is empty")]
    EmptyResults,

    #[error("Unsupported results format: {0}")]
    UnsupportedResults(String),

    #[error("Result record {index} does not match the format of the first record ({expected})")]
    MixedResults { index: usize, expected: &'static str },
}

pub type Result<T> = std::result::Result<T, CocoError>;

impl CocoError {
    /// Attach the offending file path to an error raised while loading it.
    pub(crate) fn in_file(self, path: impl Into<PathBuf>) -> Self {
        CocoError::File {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
