use std::fmt;
use std::str::FromStr;

use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_encoder::{EncoderError, VideoEncoder};

use super::ffmpeg_encoder::FfmpegEncoder;

/// Hardware H.264 encoders, tried in order before software.
const HARDWARE_H264: &[&str] = &[
    "h264_videotoolbox",
    "h264_nvenc",
    "h264_qsv",
    "h264_amf",
    "h264_mediacodec",
];
const SOFTWARE_H264: &str = "libx264";
const FALLBACK: &str = "mpeg4";

/// Which encoder the writer should use.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum CodecPreference {
    /// Best H.264 encoder that opens on this machine, else MPEG-4 Part 2.
    #[default]
    Auto,
    H264,
    Mpeg4,
    /// An exact libavcodec encoder name.
    Named(String),
}

impl CodecPreference {
    /// Encoder names to probe, most preferred first.
    pub fn candidates(&self) -> Vec<String> {
        let names: Vec<&str> = match self {
            CodecPreference::Auto => HARDWARE_H264
                .iter()
                .copied()
                .chain([SOFTWARE_H264, FALLBACK])
                .collect(),
            CodecPreference::H264 => HARDWARE_H264
                .iter()
                .copied()
                .chain([SOFTWARE_H264])
                .collect(),
            CodecPreference::Mpeg4 => vec![FALLBACK],
            CodecPreference::Named(name) => vec![name.as_str()],
        };
        names.into_iter().map(String::from).collect()
    }
}

impl FromStr for CodecPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Err("codec name is empty".to_string()),
            "auto" => Ok(CodecPreference::Auto),
            "h264" | "avc" => Ok(CodecPreference::H264),
            "mpeg4" => Ok(CodecPreference::Mpeg4),
            other => Ok(CodecPreference::Named(other.to_string())),
        }
    }
}

impl fmt::Display for CodecPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecPreference::Auto => write!(f, "auto"),
            CodecPreference::H264 => write!(f, "h264"),
            CodecPreference::Mpeg4 => write!(f, "mpeg4"),
            CodecPreference::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Creates the first encoder from `preference` that can actually be opened
/// with `metadata`.
///
/// Each candidate is opened once and released again, so the returned encoder
/// is unconfigured and the caller decides when the codec really starts.
pub fn create_encoder(
    preference: &CodecPreference,
    metadata: &VideoMetadata,
) -> Result<Box<dyn VideoEncoder>, EncoderError> {
    metadata.validate().map_err(EncoderError::Configure)?;

    for name in preference.candidates() {
        match probe(&name, metadata) {
            Ok(()) => {
                log::info!("Using encoder {name} ({preference} preference)");
                return Ok(Box::new(FfmpegEncoder::new(name)));
            }
            Err(e) => log::debug!("Encoder {name} unusable: {e}"),
        }
    }
    Err(EncoderError::Unavailable(preference.to_string()))
}

fn probe(name: &str, metadata: &VideoMetadata) -> Result<(), EncoderError> {
    let mut encoder = FfmpegEncoder::new(name);
    encoder.configure(metadata, false)?;
    let started = encoder.start();
    encoder.release()?;
    started
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("auto", CodecPreference::Auto)]
    #[case("H264", CodecPreference::H264)]
    #[case("avc", CodecPreference::H264)]
    #[case(" mpeg4 ", CodecPreference::Mpeg4)]
    #[case("h264_nvenc", CodecPreference::Named("h264_nvenc".into()))]
    fn test_parse_preference(#[case] input: &str, #[case] expected: CodecPreference) {
        assert_eq!(input.parse::<CodecPreference>().unwrap(), expected);
    }

    #[test]
    fn test_parse_empty_is_error() {
        assert!("  ".parse::<CodecPreference>().is_err());
    }

    #[test]
    fn test_auto_ends_with_software_fallbacks() {
        let names = CodecPreference::Auto.candidates();
        assert_eq!(names.first().map(String::as_str), Some("h264_videotoolbox"));
        assert_eq!(&names[names.len() - 2..], ["libx264", "mpeg4"]);
    }

    #[test]
    fn test_h264_never_falls_back_to_mpeg4() {
        assert!(!CodecPreference::H264
            .candidates()
            .contains(&"mpeg4".to_string()));
    }

    #[test]
    fn test_auto_finds_an_encoder() {
        let encoder = create_encoder(&CodecPreference::Auto, &VideoMetadata::new(160, 120, 30));
        assert!(encoder.is_ok());
    }

    #[test]
    fn test_unknown_named_encoder_is_unavailable() {
        let result = create_encoder(
            &CodecPreference::Named("no_such_encoder".into()),
            &VideoMetadata::new(160, 120, 30),
        );
        assert!(matches!(result, Err(EncoderError::Unavailable(_))));
    }

    #[test]
    fn test_invalid_metadata_is_rejected_before_probing() {
        let result = create_encoder(&CodecPreference::Mpeg4, &VideoMetadata::new(161, 120, 30));
        assert!(matches!(result, Err(EncoderError::Configure(_))));
    }
}
