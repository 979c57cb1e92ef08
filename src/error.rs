use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures inside the bundling pipeline.
///
/// Tokenizer problems never show up here (the counter degrades to an
/// estimate) and coordination outcomes are skips, not errors.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("transcript {} not found", path.display())]
    TranscriptMissing { path: PathBuf },

    #[error("reading transcript {}", path.display())]
    TranscriptRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serializing bundle")]
    Serialize(#[from] serde_json::Error),

    #[error("writing {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BundleError {
    pub fn persist(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
