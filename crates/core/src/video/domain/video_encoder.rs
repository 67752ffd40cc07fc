use thiserror::Error;

use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("no encoder available for {0}")]
    Unavailable(String),
    #[error("encoder configuration failed: {0}")]
    Configure(String),
    #[error("encoder is not running (state: {0})")]
    NotRunning(&'static str),
    #[error("encoder backend error: {0}")]
    Backend(String),
}

/// Codec description negotiated by the encoder once it produces output.
///
/// The muxer needs this to add its track before writing the first sample.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    /// Codec MIME type, e.g. `video/avc`.
    pub mime: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bit_rate: u64,
    /// Codec-specific setup data (SPS/PPS, VOL header, ...). May be empty.
    pub extradata: Vec<u8>,
}

/// One compressed access unit pulled from the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedSample {
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Decode timestamp in microseconds, when the encoder reports one.
    pub dts_us: Option<i64>,
    pub is_keyframe: bool,
}

/// Buffer submitted to the encoder's input queue.
#[derive(Clone, Copy, Debug)]
pub enum EncoderInput<'a> {
    /// A raw 4:2:0 frame and its presentation timestamp in microseconds.
    Frame { data: &'a [u8], pts_us: i64 },
    /// Zero-length marker asking the encoder to flush everything it holds.
    EndOfStream { pts_us: i64 },
}

/// Result of a non-blocking poll of the encoder's output queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncoderOutput {
    Sample(EncodedSample),
    /// Nothing ready yet; more input (or time) is needed.
    Pending,
    /// The encoder has flushed everything after an end-of-stream marker.
    EndOfStream,
}

/// Push/pull interface to a (possibly hardware) video encoder.
///
/// Lifecycle: `configure` once, `start` lazily before the first input, then
/// any number of `queue_input`/`poll_output` rounds, then `release`.
pub trait VideoEncoder: Send {
    /// Prepares the codec without acquiring the running resource.
    fn configure(&mut self, metadata: &VideoMetadata, global_header: bool)
        -> Result<(), EncoderError>;

    fn start(&mut self) -> Result<(), EncoderError>;

    /// Submits one input buffer, blocking until the encoder has room for it.
    fn queue_input(&mut self, input: EncoderInput<'_>) -> Result<(), EncoderError>;

    /// Returns immediately with whatever the encoder has ready.
    fn poll_output(&mut self) -> Result<EncoderOutput, EncoderError>;

    /// Only meaningful once the encoder has started.
    fn output_format(&self) -> Result<StreamFormat, EncoderError>;

    /// Stops the codec and frees it. Later calls are no-ops.
    fn release(&mut self) -> Result<(), EncoderError>;
}

/// MIME type used in [`StreamFormat`] for a codec short name.
pub fn mime_for_codec(codec_name: &str) -> Option<&'static str> {
    match codec_name {
        "h264" => Some("video/avc"),
        "hevc" => Some("video/hevc"),
        "mpeg4" => Some("video/mp4v-es"),
        "av1" => Some("video/av01"),
        "vp9" => Some("video/x-vnd.on2.vp9"),
        _ => None,
    }
}

/// Inverse of [`mime_for_codec`].
pub fn codec_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "video/avc" => Some("h264"),
        "video/hevc" => Some("hevc"),
        "video/mp4v-es" => Some("mpeg4"),
        "video/av01" => Some("av1"),
        "video/x-vnd.on2.vp9" => Some("vp9"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_mapping_round_trips() {
        for codec in ["h264", "hevc", "mpeg4", "av1", "vp9"] {
            let mime = mime_for_codec(codec).unwrap();
            assert_eq!(codec_for_mime(mime), Some(codec));
        }
    }

    #[test]
    fn test_unknown_codec_has_no_mime() {
        assert_eq!(mime_for_codec("prores"), None);
        assert_eq!(codec_for_mime("video/quicktime"), None);
    }
}
