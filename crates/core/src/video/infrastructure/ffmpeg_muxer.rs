use std::path::{Path, PathBuf};

use ffmpeg_next::codec::Id;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::{packet, Packet, Rational};

use crate::shared::constants::MICROS_PER_SECOND;
use crate::video::domain::container_muxer::{ContainerMuxer, MuxerError};
use crate::video::domain::video_encoder::{codec_for_mime, EncodedSample, StreamFormat};

// libavcodec requires this much zeroed slack after extradata.
const EXTRADATA_PADDING: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Created,
    TrackAdded,
    Started,
    Stopped,
    Released,
}

/// Writes encoded samples into an MP4 (or any libavformat) container.
///
/// The output file is opened on construction. The track is described from
/// the encoder's negotiated [`StreamFormat`] rather than from an encoder
/// context, so any [`VideoEncoder`](crate::video::domain::video_encoder::VideoEncoder)
/// can feed it.
pub struct FfmpegMuxer {
    path: PathBuf,
    octx: Option<Output>,
    stage: Stage,
    track: Option<usize>,
    samples_written: u64,
}

// Safety: FfmpegMuxer is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegMuxer {}

impl FfmpegMuxer {
    pub fn create(path: &Path) -> Result<Self, MuxerError> {
        let open_error = |reason: String| MuxerError::Open {
            path: path.display().to_string(),
            reason,
        };
        ffmpeg_next::init().map_err(|e| open_error(e.to_string()))?;
        let octx = ffmpeg_next::format::output(path).map_err(|e| open_error(e.to_string()))?;

        log::debug!("Muxer opened at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            octx: Some(octx),
            stage: Stage::Created,
            track: None,
            samples_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn output(&mut self) -> Result<&mut Output, MuxerError> {
        self.octx
            .as_mut()
            .ok_or(MuxerError::InvalidState("muxer already released"))
    }
}

impl ContainerMuxer for FfmpegMuxer {
    fn add_track(&mut self, format: &StreamFormat) -> Result<usize, MuxerError> {
        if self.stage != Stage::Created {
            return Err(MuxerError::InvalidState("track already added"));
        }
        let codec_id = codec_for_mime(&format.mime)
            .and_then(codec_id_for)
            .ok_or_else(|| MuxerError::UnsupportedFormat(format.mime.clone()))?;

        let octx = self.output()?;
        let mut stream = octx
            .add_stream(ffmpeg_next::encoder::find(codec_id))
            .map_err(backend)?;
        let index = stream.index();
        stream.set_time_base(Rational(1, format.fps.max(1) as i32));

        unsafe {
            let raw_stream = stream.as_mut_ptr();
            let codecpar = (*raw_stream).codecpar;
            (*codecpar).codec_type = ffmpeg_next::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*codecpar).codec_id = codec_id.into();
            (*codecpar).codec_tag = 0;
            (*codecpar).width = format.width as i32;
            (*codecpar).height = format.height as i32;
            (*codecpar).bit_rate = format.bit_rate as i64;
            (*codecpar).format = ffmpeg_next::ffi::AVPixelFormat::AV_PIX_FMT_YUV420P as i32;

            if !format.extradata.is_empty() {
                let len = format.extradata.len();
                let buf = ffmpeg_next::ffi::av_mallocz(len + EXTRADATA_PADDING) as *mut u8;
                if buf.is_null() {
                    return Err(MuxerError::Backend("out of memory for extradata".into()));
                }
                std::ptr::copy_nonoverlapping(format.extradata.as_ptr(), buf, len);
                // codecpar owns the buffer from here and frees it with the stream.
                (*codecpar).extradata = buf;
                (*codecpar).extradata_size = len as i32;
            }

            let rate = ffmpeg_next::ffi::AVRational {
                num: format.fps as i32,
                den: 1,
            };
            (*raw_stream).avg_frame_rate = rate;
            (*raw_stream).r_frame_rate = rate;
        }

        self.track = Some(index);
        self.stage = Stage::TrackAdded;
        log::info!(
            "Muxer track {index} added: {} {}x{}",
            format.mime,
            format.width,
            format.height
        );
        Ok(index)
    }

    fn start(&mut self) -> Result<(), MuxerError> {
        if self.stage != Stage::TrackAdded {
            return Err(MuxerError::InvalidState("start requires exactly one added track"));
        }
        self.output()?.write_header().map_err(backend)?;
        self.stage = Stage::Started;
        Ok(())
    }

    fn write_sample(&mut self, track: usize, sample: &EncodedSample) -> Result<(), MuxerError> {
        if self.stage != Stage::Started {
            return Err(MuxerError::InvalidState("write before start or after stop"));
        }
        if self.track != Some(track) {
            return Err(MuxerError::InvalidState("unknown track index"));
        }

        let octx = self.output()?;
        let stream_time_base = octx
            .stream(track)
            .map(|s| s.time_base())
            .ok_or(MuxerError::InvalidState("unknown track index"))?;

        let mut pkt = Packet::copy(&sample.data);
        pkt.set_pts(Some(sample.pts_us));
        pkt.set_dts(Some(sample.dts_us.unwrap_or(sample.pts_us)));
        if sample.is_keyframe {
            pkt.set_flags(packet::Flags::KEY);
        }
        pkt.set_stream(track);
        pkt.rescale_ts(Rational(1, MICROS_PER_SECOND as i32), stream_time_base);
        pkt.write_interleaved(octx).map_err(backend)?;

        self.samples_written += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MuxerError> {
        if self.stage != Stage::Started {
            return Err(MuxerError::InvalidState("stop before start"));
        }
        self.output()?.write_trailer().map_err(backend)?;
        self.stage = Stage::Stopped;
        log::info!(
            "Muxer finished {} ({} samples)",
            self.path.display(),
            self.samples_written
        );
        Ok(())
    }

    fn release(&mut self) {
        if self.octx.take().is_some() {
            log::debug!("Muxer released at {}", self.path.display());
        }
        self.stage = Stage::Released;
    }

    fn wants_global_header(&self) -> bool {
        self.octx.as_ref().is_some_and(|octx| {
            octx.format()
                .flags()
                .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
        })
    }
}

fn codec_id_for(codec_name: &str) -> Option<Id> {
    match codec_name {
        "h264" => Some(Id::H264),
        "hevc" => Some(Id::HEVC),
        "mpeg4" => Some(Id::MPEG4),
        "av1" => Some(Id::AV1),
        "vp9" => Some(Id::VP9),
        _ => None,
    }
}

fn backend(e: ffmpeg_next::Error) -> MuxerError {
    MuxerError::Backend(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::raw_frame::RawFrame;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_encoder::{EncoderInput, EncoderOutput, VideoEncoder};
    use crate::video::infrastructure::ffmpeg_encoder::FfmpegEncoder;

    fn encode_samples(count: i64, global_header: bool) -> (StreamFormat, Vec<EncodedSample>) {
        let mut encoder = FfmpegEncoder::new("mpeg4");
        encoder
            .configure(&VideoMetadata::new(160, 120, 30), global_header)
            .unwrap();
        encoder.start().unwrap();
        for k in 0..count {
            let frame = RawFrame::filled(160, 120, 100);
            encoder
                .queue_input(EncoderInput::Frame {
                    data: frame.data(),
                    pts_us: k * MICROS_PER_SECOND / 30,
                })
                .unwrap();
        }
        encoder
            .queue_input(EncoderInput::EndOfStream {
                pts_us: count * MICROS_PER_SECOND / 30,
            })
            .unwrap();

        let mut samples = Vec::new();
        loop {
            match encoder.poll_output().unwrap() {
                EncoderOutput::Sample(s) => samples.push(s),
                EncoderOutput::EndOfStream => break,
                EncoderOutput::Pending => std::thread::yield_now(),
            }
        }
        (encoder.output_format().unwrap(), samples)
    }

    #[test]
    fn test_create_opens_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let muxer = FfmpegMuxer::create(&path).unwrap();
        assert!(path.exists());
        assert!(muxer.wants_global_header());
    }

    #[test]
    fn test_writes_playable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let mut muxer = FfmpegMuxer::create(&path).unwrap();
        let (format, samples) = encode_samples(4, muxer.wants_global_header());

        let track = muxer.add_track(&format).unwrap();
        muxer.start().unwrap();
        for sample in &samples {
            muxer.write_sample(track, sample).unwrap();
        }
        muxer.stop().unwrap();
        muxer.release();

        assert_eq!(muxer.samples_written(), 4);
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .unwrap();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .unwrap()
            .decoder()
            .video()
            .unwrap();
        assert_eq!((decoder.width(), decoder.height()), (160, 120));
    }

    #[test]
    fn test_write_before_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = FfmpegMuxer::create(&dir.path().join("out.mp4")).unwrap();
        let sample = EncodedSample {
            data: vec![0, 0, 1],
            pts_us: 0,
            dts_us: None,
            is_keyframe: true,
        };
        assert!(matches!(
            muxer.write_sample(0, &sample),
            Err(MuxerError::InvalidState(_))
        ));
        assert!(muxer.stop().is_err());
    }

    #[test]
    fn test_unsupported_mime_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = FfmpegMuxer::create(&dir.path().join("out.mp4")).unwrap();
        let format = StreamFormat {
            mime: "video/quicktime".into(),
            width: 160,
            height: 120,
            fps: 30,
            bit_rate: 0,
            extradata: Vec::new(),
        };
        assert!(matches!(
            muxer.add_track(&format),
            Err(MuxerError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_release_twice_is_safe() {
        let dir = tempfile::tempdir().unwrap();
        let mut muxer = FfmpegMuxer::create(&dir.path().join("out.mp4")).unwrap();
        muxer.release();
        muxer.release();
        assert!(!muxer.wants_global_header());
    }
}
