use std::collections::VecDeque;

use ffmpeg_next::codec::encoder::video::{Encoder, Video as UnopenedEncoder};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::ffi::EAGAIN;
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::{Dictionary, Packet, Rational};

use crate::shared::constants::MICROS_PER_SECOND;
use crate::shared::raw_frame::raw_frame_len;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_encoder::{
    mime_for_codec, EncodedSample, EncoderError, EncoderInput, EncoderOutput, StreamFormat,
    VideoEncoder,
};

enum Stage {
    Unconfigured,
    Configured(UnopenedEncoder),
    Running(Encoder),
    Released,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Unconfigured => "unconfigured",
            Stage::Configured(_) => "configured",
            Stage::Running(_) => "running",
            Stage::Released => "released",
        }
    }
}

/// Encoded packets pulled from libavcodec but not yet handed to the caller.
#[derive(Default)]
struct OutputQueue {
    pending: VecDeque<EncodedSample>,
    finished: bool,
}

impl OutputQueue {
    /// Moves every packet the encoder has ready into the queue.
    /// Returns how many were collected.
    fn pull_from(&mut self, encoder: &mut Encoder, fps: u32) -> Result<usize, EncoderError> {
        let mut collected = 0;
        let mut packet = Packet::empty();
        loop {
            match encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    self.pending.push_back(to_sample(&packet, fps));
                    collected += 1;
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => break,
                Err(ffmpeg_next::Error::Eof) => {
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(backend(e)),
            }
        }
        Ok(collected)
    }
}

/// Video encoder backed by libavcodec (`send_frame` / `receive_packet`).
///
/// Configuration builds the codec context; the codec is only opened on
/// `start`, so a writer that never sees a frame never holds a running
/// (possibly hardware) encoder. Timestamps cross this boundary in
/// microseconds and are converted to the codec's `1/fps` time base inside.
pub struct FfmpegEncoder {
    encoder_name: String,
    codec_name: String,
    metadata: Option<VideoMetadata>,
    stage: Stage,
    output: OutputQueue,
}

// Safety: FfmpegEncoder is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegEncoder {}

impl FfmpegEncoder {
    /// `encoder_name` is an libavcodec encoder name such as `mpeg4` or `h264_nvenc`.
    pub fn new(encoder_name: impl Into<String>) -> Self {
        Self {
            encoder_name: encoder_name.into(),
            codec_name: String::new(),
            metadata: None,
            stage: Stage::Unconfigured,
            output: OutputQueue::default(),
        }
    }

    pub fn encoder_name(&self) -> &str {
        &self.encoder_name
    }

    fn fps(&self) -> u32 {
        self.metadata.as_ref().map_or(1, |m| m.fps.max(1))
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn configure(
        &mut self,
        metadata: &VideoMetadata,
        global_header: bool,
    ) -> Result<(), EncoderError> {
        metadata.validate().map_err(EncoderError::Configure)?;
        ffmpeg_next::init().map_err(backend)?;

        let codec = ffmpeg_next::encoder::find_by_name(&self.encoder_name)
            .ok_or_else(|| EncoderError::Unavailable(self.encoder_name.clone()))?;

        let mut ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| EncoderError::Configure(e.to_string()))?;

        let fps = metadata.fps as i32;
        ctx.set_width(metadata.width);
        ctx.set_height(metadata.height);
        ctx.set_format(Pixel::YUV420P);
        ctx.set_time_base(Rational(1, fps));
        ctx.set_frame_rate(Some(Rational(fps, 1)));
        ctx.set_bit_rate(metadata.bit_rate as usize);
        ctx.set_gop(metadata.gop_size());
        // Samples are muxed as they come out; keep decode order == presentation order.
        ctx.set_max_b_frames(0);
        if global_header {
            ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        self.codec_name = codec.id().name().to_string();
        self.metadata = Some(metadata.clone());
        self.stage = Stage::Configured(ctx);

        log::debug!(
            "Encoder {} configured: {}x{} @ {} fps, {} bps",
            self.encoder_name,
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.bit_rate
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), EncoderError> {
        match std::mem::replace(&mut self.stage, Stage::Released) {
            Stage::Configured(ctx) => {
                let encoder = ctx
                    .open_with(Dictionary::new())
                    .map_err(|e| EncoderError::Configure(e.to_string()))?;
                self.stage = Stage::Running(encoder);
                log::info!("Encoder {} started", self.encoder_name);
                Ok(())
            }
            Stage::Running(encoder) => {
                self.stage = Stage::Running(encoder);
                Ok(())
            }
            other => {
                let name = other.name();
                self.stage = other;
                Err(EncoderError::NotRunning(name))
            }
        }
    }

    fn queue_input(&mut self, input: EncoderInput<'_>) -> Result<(), EncoderError> {
        let fps = self.fps();
        let (width, height) = match &self.metadata {
            Some(m) => (m.width, m.height),
            None => return Err(EncoderError::NotRunning(self.stage.name())),
        };
        let encoder = match &mut self.stage {
            Stage::Running(encoder) => encoder,
            other => return Err(EncoderError::NotRunning(other.name())),
        };

        let frame = match input {
            EncoderInput::Frame { data, pts_us } => {
                let expected = raw_frame_len(width, height);
                if data.len() != expected {
                    return Err(EncoderError::Backend(format!(
                        "input buffer is {} bytes, expected {expected}",
                        data.len()
                    )));
                }
                let mut frame = VideoFrame::new(Pixel::YUV420P, width, height);
                fill_i420(&mut frame, data, width as usize, height as usize);
                frame.set_pts(Some(micros_to_ticks(pts_us, fps)));
                Some(frame)
            }
            EncoderInput::EndOfStream { .. } => None,
        };

        // libavcodec refuses input with EAGAIN until pending output is read;
        // park that output in the queue and retry, which is the blocking
        // "wait for a free input slot".
        loop {
            let sent = match &frame {
                Some(frame) => encoder.send_frame(frame),
                None => encoder.send_eof(),
            };
            match sent {
                Ok(()) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {
                    if self.output.pull_from(encoder, fps)? == 0 {
                        std::thread::yield_now();
                    }
                }
                Err(e) => return Err(backend(e)),
            }
        }
    }

    fn poll_output(&mut self) -> Result<EncoderOutput, EncoderError> {
        if let Some(sample) = self.output.pending.pop_front() {
            return Ok(EncoderOutput::Sample(sample));
        }
        if self.output.finished {
            return Ok(EncoderOutput::EndOfStream);
        }

        let fps = self.fps();
        let encoder = match &mut self.stage {
            Stage::Running(encoder) => encoder,
            other => return Err(EncoderError::NotRunning(other.name())),
        };
        self.output.pull_from(encoder, fps)?;

        Ok(match self.output.pending.pop_front() {
            Some(sample) => EncoderOutput::Sample(sample),
            None if self.output.finished => EncoderOutput::EndOfStream,
            None => EncoderOutput::Pending,
        })
    }

    fn output_format(&self) -> Result<StreamFormat, EncoderError> {
        let (Stage::Running(encoder), Some(metadata)) = (&self.stage, &self.metadata) else {
            return Err(EncoderError::NotRunning(self.stage.name()));
        };
        let mime = mime_for_codec(&self.codec_name)
            .ok_or_else(|| EncoderError::Unavailable(format!("MIME type for {}", self.codec_name)))?;

        let params = ffmpeg_next::codec::Parameters::from(encoder);
        let extradata = unsafe {
            let raw = params.as_ptr();
            if (*raw).extradata.is_null() || (*raw).extradata_size <= 0 {
                Vec::new()
            } else {
                std::slice::from_raw_parts((*raw).extradata, (*raw).extradata_size as usize)
                    .to_vec()
            }
        };

        Ok(StreamFormat {
            mime: mime.to_string(),
            width: metadata.width,
            height: metadata.height,
            fps: metadata.fps,
            bit_rate: metadata.bit_rate,
            extradata,
        })
    }

    fn release(&mut self) -> Result<(), EncoderError> {
        let previous = std::mem::replace(&mut self.stage, Stage::Released);
        if matches!(previous, Stage::Running(_)) {
            log::info!("Encoder {} released", self.encoder_name);
        }
        self.output.pending.clear();
        Ok(())
    }
}

/// Copies I420 planes into an ffmpeg frame, respecting each plane's stride.
fn fill_i420(frame: &mut VideoFrame, data: &[u8], width: usize, height: usize) {
    let (luma, chroma) = data.split_at(width * height);
    let (cb, cr) = chroma.split_at((width / 2) * (height / 2));
    copy_plane(frame, 0, luma, width, height);
    copy_plane(frame, 1, cb, width / 2, height / 2);
    copy_plane(frame, 2, cr, width / 2, height / 2);
}

fn copy_plane(frame: &mut VideoFrame, plane: usize, src: &[u8], row_len: usize, rows: usize) {
    let stride = frame.stride(plane);
    let dst = frame.data_mut(plane);
    for row in 0..rows {
        let dst_start = row * stride;
        let src_start = row * row_len;
        dst[dst_start..dst_start + row_len].copy_from_slice(&src[src_start..src_start + row_len]);
    }
}

fn to_sample(packet: &Packet, fps: u32) -> EncodedSample {
    let pts_ticks = packet.pts().unwrap_or(0);
    EncodedSample {
        data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
        pts_us: ticks_to_micros(pts_ticks, fps),
        dts_us: packet.dts().map(|dts| ticks_to_micros(dts, fps)),
        is_keyframe: packet.is_key(),
    }
}

/// Rounds to the nearest `1/fps` tick so `k * 1_000_000 / fps` maps back to `k`.
fn micros_to_ticks(pts_us: i64, fps: u32) -> i64 {
    (pts_us * i64::from(fps) + MICROS_PER_SECOND / 2) / MICROS_PER_SECOND
}

fn ticks_to_micros(ticks: i64, fps: u32) -> i64 {
    ticks * MICROS_PER_SECOND / i64::from(fps.max(1))
}

fn backend(e: ffmpeg_next::Error) -> EncoderError {
    EncoderError::Backend(e.to_string())
}
