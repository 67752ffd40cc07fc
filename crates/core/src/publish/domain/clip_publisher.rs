use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("clip not found: {0}")]
    SourceMissing(PathBuf),
    #[error("invalid display name {0:?}")]
    InvalidName(String),
    #[error("no free name for {0} in the library")]
    NameTaken(String),
    #[error("failed to publish to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A clip that is now visible in the library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedClip {
    pub path: PathBuf,
    pub mime: &'static str,
    pub size_bytes: u64,
}

/// Hands a finished clip over to a user-visible library.
///
/// Implementations must not expose a partially copied clip under its final
/// name.
pub trait ClipPublisher: Send {
    fn publish(&self, clip: &Path, display_name: &str) -> Result<PublishedClip, PublishError>;
}
