use thiserror::Error;

use super::video_encoder::{EncodedSample, StreamFormat};

#[derive(Error, Debug)]
pub enum MuxerError {
    #[error("failed to open container at {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("unsupported stream format {0}")]
    UnsupportedFormat(String),
    #[error("muxer used out of order: {0}")]
    InvalidState(&'static str),
    #[error("muxer backend error: {0}")]
    Backend(String),
}

/// Interleaves compressed samples into a container file.
///
/// Protocol: `add_track` → `start` → `write_sample`* → `stop`, then `release`.
/// The output file exists from construction so a caller can discard it if no
/// sample ever arrives.
pub trait ContainerMuxer: Send {
    /// Adds the single video track and returns its index.
    fn add_track(&mut self, format: &StreamFormat) -> Result<usize, MuxerError>;

    /// Writes the container header. Only valid after `add_track`.
    fn start(&mut self) -> Result<(), MuxerError>;

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<(), MuxerError>;

    /// Writes the trailer/index, finishing a playable file.
    fn stop(&mut self) -> Result<(), MuxerError>;

    /// Closes the underlying file handle. Safe to call in any state, more than once.
    fn release(&mut self);

    /// Whether encoders must place codec setup data out of band (e.g. MP4 `avcC`).
    fn wants_global_header(&self) -> bool {
        false
    }
}
