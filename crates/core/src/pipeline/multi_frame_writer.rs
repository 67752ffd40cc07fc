use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use crate::shared::raw_frame::RawFrame;
use crate::shared::video_metadata::VideoMetadata;
use crate::shared::window_config::WindowConfig;
use crate::storage::domain::frame_store::FrameStore;
use crate::storage::infrastructure::disk_frame_store::DiskFrameStore;
use crate::video::domain::container_muxer::{ContainerMuxer, MuxerError};
use crate::video::domain::video_encoder::{EncoderError, VideoEncoder};
use crate::video::infrastructure::encoder_factory::{create_encoder, CodecPreference};
use crate::video::infrastructure::ffmpeg_muxer::FfmpegMuxer;

use super::encode_mux_pipeline::{EncodeMuxPipeline, FinalizeError};
use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use super::window_selector::{compute_range, FrameBudget};

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("invalid video parameters: {0}")]
    InvalidMetadata(String),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Muxer(#[from] MuxerError),
}

/// Buffers raw frames on disk and encodes a window of them into one clip.
///
/// Frames are persisted as they arrive (`submit`), so only one frame is in
/// memory at a time. `finalize_around` picks the frames near a centre index
/// and pushes them through the encoder; `finish` closes the container and
/// clears the scratch area. Dropping the writer runs `finish`.
pub struct MultiFrameWriter {
    output_path: PathBuf,
    metadata: VideoMetadata,
    config: WindowConfig,
    budget: FrameBudget,
    store: Box<dyn FrameStore>,
    pipeline: EncodeMuxPipeline,
    logger: Box<dyn PipelineLogger>,
    next_index: u64,
    finished: bool,
    output_kept: bool,
}

impl MultiFrameWriter {
    /// Wires a writer from its parts. The muxer is expected to have created
    /// `output_path` already; it is removed again if construction fails.
    pub fn new(
        output_path: impl Into<PathBuf>,
        metadata: VideoMetadata,
        config: WindowConfig,
        store: Box<dyn FrameStore>,
        encoder: Box<dyn VideoEncoder>,
        mut muxer: Box<dyn ContainerMuxer>,
    ) -> Result<Self, WriterError> {
        let output_path = output_path.into();
        if let Err(reason) = metadata.validate() {
            muxer.release();
            remove_output(&output_path);
            return Err(WriterError::InvalidMetadata(reason));
        }

        let mut pipeline = EncodeMuxPipeline::new(encoder, muxer, metadata.clone());
        if let Err(e) = pipeline.configure() {
            remove_output(&output_path);
            return Err(e.into());
        }

        log::info!(
            "Clip writer for {}: budget {}, radius {}, skip limit {}",
            output_path.display(),
            if config.is_budget_unlimited() {
                "unlimited".to_string()
            } else {
                config.total_frame_budget.to_string()
            },
            config.neighbor_radius,
            config.frame_skip_limit
        );

        Ok(Self {
            output_path,
            metadata,
            budget: FrameBudget::new(config.total_frame_budget),
            config,
            store,
            pipeline,
            logger: Box::new(NullPipelineLogger),
            next_index: 0,
            finished: false,
            output_kept: false,
        })
    }

    /// Writer backed by libav: scratch records under `scratch_dir`, the first
    /// encoder from `codec` that opens, and an MP4 muxer at `output_path`.
    pub fn create(
        output_path: &Path,
        scratch_dir: &Path,
        metadata: VideoMetadata,
        config: WindowConfig,
        codec: &CodecPreference,
    ) -> Result<Self, WriterError> {
        metadata.validate().map_err(WriterError::InvalidMetadata)?;
        let encoder = create_encoder(codec, &metadata)?;
        let muxer = FfmpegMuxer::create(output_path)?;
        Self::new(
            output_path,
            metadata,
            config,
            Box::new(DiskFrameStore::new(scratch_dir)),
            encoder,
            Box::new(muxer),
        )
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Number of sequence indices handed out so far, including failed ones.
    pub fn submitted_count(&self) -> u64 {
        self.next_index
    }

    pub fn frames_fed(&self) -> u64 {
        self.pipeline.frames_fed()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether `finish` left a clip at `output_path`.
    pub fn output_kept(&self) -> bool {
        self.output_kept
    }

    /// Stores `frame` under the next sequence index and returns that index.
    ///
    /// Never fails: a frame that cannot be stored is logged and left out,
    /// but its index is still used up.
    pub fn submit(&mut self, frame: &RawFrame) -> u64 {
        let index = self.next_index;
        self.next_index += 1;

        if self.finished {
            log::warn!("Frame {index} submitted after finish, ignored");
            return index;
        }
        if frame.width() != self.metadata.width || frame.height() != self.metadata.height {
            log::warn!(
                "Frame {index} is {}x{}, writer expects {}x{}; not stored",
                frame.width(),
                frame.height(),
                self.metadata.width,
                self.metadata.height
            );
            return index;
        }

        let started = Instant::now();
        match self.store.persist(index, frame) {
            Ok(()) => self.logger.timing("persist", elapsed_ms(started)),
            Err(e) => log::warn!("Frame {index} not stored: {e}"),
        }
        index
    }

    /// Encodes the stored frames within `neighbor_radius` of `center`.
    ///
    /// Stops once the lifetime frame budget is used up; frames past that
    /// point stay in the scratch area until `finish`. Missing records are
    /// skipped, which includes frames consumed by an earlier call, so
    /// overlapping windows do not encode a frame twice.
    pub fn finalize_around(&mut self, center: i64) {
        if self.finished {
            log::warn!("finalize_around({center}) after finish, ignored");
            return;
        }
        if self.next_index == 0 {
            log::debug!("finalize_around({center}) with no submitted frames");
            return;
        }

        let window = compute_range(center, self.next_index, self.config.neighbor_radius);
        let Some((low, high)) = window.bounds() else {
            log::info!(
                "No frames within {} of {center} ({} submitted)",
                self.config.neighbor_radius,
                self.next_index
            );
            return;
        };
        let budget_note = match self.budget.remaining(self.pipeline.frames_fed()) {
            Some(left) => format!(", {left} left in frame budget"),
            None => String::new(),
        };
        self.logger.info(&format!(
            "Encoding frames {low}..={high} around {center}{budget_note}"
        ));

        let total = window.len() as usize;
        for (position, index) in window.indices().enumerate() {
            if !self.budget.permits(self.pipeline.frames_fed()) {
                self.logger.info(&format!(
                    "Frame budget of {} reached at index {index}",
                    self.config.total_frame_budget
                ));
                break;
            }
            self.feed_index(index);
            self.logger.progress(position + 1, total);
        }
    }

    fn feed_index(&mut self, index: u64) {
        if !self.store.exists(index) {
            self.logger.dropped(index, "no stored record");
            return;
        }

        let started = Instant::now();
        let frame = match self.store.read(index) {
            Ok(frame) => frame,
            Err(e) => {
                self.logger.dropped(index, &e.to_string());
                self.store.delete(index);
                return;
            }
        };
        self.logger.timing("read", elapsed_ms(started));

        let started = Instant::now();
        match self.pipeline.feed(&frame) {
            Ok(()) => {
                self.logger.timing("encode", elapsed_ms(started));
                self.logger
                    .metric("samples_written", self.pipeline.samples_written() as f64);
            }
            Err(e) => self.logger.dropped(index, &e.to_string()),
        }
        self.store.delete(index);
    }

    /// Closes the clip and removes the scratch area. Safe to call repeatedly;
    /// only the first call does anything.
    ///
    /// The output file is deleted when no frame was encoded or nothing
    /// reached the container. Close failures are logged and returned, but
    /// cleanup finishes either way.
    pub fn finish(&mut self) -> Result<(), FinalizeError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let result = self.pipeline.flush_and_close();
        if let Err(e) = &result {
            log::error!("Closing {} failed: {e}", self.output_path.display());
        }
        self.store.purge_all();

        if self.pipeline.frames_fed() == 0 || !self.pipeline.has_written_any_sample() {
            remove_output(&self.output_path);
            log::info!("No frames encoded, discarded {}", self.output_path.display());
        } else {
            self.output_kept = true;
            log::info!(
                "Clip written to {} ({} frames)",
                self.output_path.display(),
                self.pipeline.frames_fed()
            );
        }
        self.logger.summary();
        result
    }
}

impl Drop for MultiFrameWriter {
    fn drop(&mut self) {
        // finish() already logged any failure.
        let _ = self.finish();
    }
}

fn remove_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {e}", path.display()),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
