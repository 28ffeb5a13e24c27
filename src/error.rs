use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TimelineError>;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("MIDI file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read MIDI file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed timeline line: {0:?}")]
    MalformedLine(String),
}

impl TimelineError {
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        TimelineError::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        TimelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed_line(line: impl Into<String>) -> Self {
        TimelineError::MalformedLine(line.into())
    }

    /// Errors that invalidate the whole run, as opposed to a single track's output.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            TimelineError::NotFound(_) | TimelineError::Read { .. } | TimelineError::Parse(_)
        )
    }
}
