use std::path::PathBuf;

use thiserror::Error;

use crate::shared::raw_frame::RawFrame;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("frame store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame #{index} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        index: u64,
        expected: usize,
        actual: usize,
    },
    #[error("frame #{0} is not in the store")]
    NotFound(u64),
    #[error("frame #{index} record is {len} bytes, shorter than its header")]
    CorruptHeader { index: u64, len: usize },
}

/// Holds raw frames between capture and encoding, keyed by sequence index.
///
/// Each record is independently addressable so the pipeline only ever loads
/// one frame at a time.
pub trait FrameStore: Send {
    /// Persists a frame under `index`. An existing record at that index is
    /// replaced; callers never reuse an index.
    fn persist(&mut self, index: u64, frame: &RawFrame) -> Result<(), StoreError>;

    fn exists(&self, index: u64) -> bool;

    fn read(&self, index: u64) -> Result<RawFrame, StoreError>;

    /// Removes a record. Returns whether anything was actually deleted.
    fn delete(&mut self, index: u64) -> bool;

    /// Drops every record and the backing area. Failures are logged, never returned.
    fn purge_all(&mut self);
}
