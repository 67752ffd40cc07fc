use std::time::Duration;

use thiserror::Error;

use crate::shared::constants::{
    END_OF_STREAM_POLL_INTERVAL_MS, MAX_END_OF_STREAM_IDLE_POLLS, MICROS_PER_SECOND,
};
use crate::shared::raw_frame::RawFrame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::container_muxer::{ContainerMuxer, MuxerError};
use crate::video::domain::video_encoder::{
    EncodedSample, EncoderError, EncoderInput, EncoderOutput, VideoEncoder,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    EncoderConfigured,
    EncoderRunning,
    Finalizing,
    Closed,
}

#[derive(Error, Debug)]
pub enum DrainError {
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Muxer(#[from] MuxerError),
}

/// Failure to get one frame into the encoder. The frame is lost; the
/// pipeline stays usable.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("pipeline is not configured yet")]
    NotConfigured,
    #[error("pipeline is already closed")]
    Closed,
    #[error("frame is {actual_width}x{actual_height} with {actual_len} bytes, pipeline expects {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
        actual_len: usize,
    },
    #[error("failed to start encoder: {0}")]
    Start(#[source] EncoderError),
    #[error("failed to queue frame: {0}")]
    Queue(#[source] EncoderError),
    #[error("frame queued but draining failed: {0}")]
    Drain(#[from] DrainError),
}

/// Problems hit while closing. Cleanup always runs to the end regardless.
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("failed to queue end of stream: {0}")]
    EndOfStream(#[source] EncoderError),
    #[error("failed to drain encoder after end of stream: {0}")]
    Drain(#[source] DrainError),
    #[error("encoder did not finish after {polls} idle polls")]
    FlushTimedOut { polls: usize },
    #[error("failed to release encoder: {0}")]
    ReleaseEncoder(#[source] EncoderError),
    #[error("failed to stop muxer: {0}")]
    StopMuxer(#[source] MuxerError),
    #[error("{} failures while closing, first: {}", .0.len(), .0[0])]
    Multiple(Vec<FinalizeError>),
}

impl FinalizeError {
    fn from_failures(mut failures: Vec<FinalizeError>) -> Option<Self> {
        match failures.len() {
            0 => None,
            1 => failures.pop(),
            _ => Some(FinalizeError::Multiple(failures)),
        }
    }
}

/// Presentation time of the `k`-th accepted frame.
pub fn pts_for_frame(k: u64, fps: u32) -> i64 {
    let k = i64::try_from(k).unwrap_or(i64::MAX);
    k.saturating_mul(MICROS_PER_SECOND) / i64::from(fps.max(1))
}

/// Drives an encoder and a container muxer as one unit.
///
/// The encoder is configured on construction and started on the first
/// `feed`. The muxer track is added, and the muxer started, when the first
/// encoded sample appears, because only then is the codec's output format
/// known.
pub struct EncodeMuxPipeline {
    encoder: Box<dyn VideoEncoder>,
    muxer: Box<dyn ContainerMuxer>,
    metadata: VideoMetadata,
    state: PipelineState,
    track_index: Option<usize>,
    encoder_started: bool,
    muxer_started: bool,
    has_written_any_sample: bool,
    frames_fed: u64,
    samples_written: u64,
    end_of_stream_poll_limit: usize,
}

impl EncodeMuxPipeline {
    /// Takes ownership of both ends in the `Idle` state. Call
    /// [`configure`](Self::configure) before feeding frames.
    pub fn new(
        encoder: Box<dyn VideoEncoder>,
        muxer: Box<dyn ContainerMuxer>,
        metadata: VideoMetadata,
    ) -> Self {
        Self {
            encoder,
            muxer,
            metadata,
            state: PipelineState::Idle,
            track_index: None,
            encoder_started: false,
            muxer_started: false,
            has_written_any_sample: false,
            frames_fed: 0,
            samples_written: 0,
            end_of_stream_poll_limit: MAX_END_OF_STREAM_IDLE_POLLS,
        }
    }

    /// Configures the encoder without starting it. On failure the muxer is
    /// released and the pipeline closes. Later calls are no-ops.
    pub fn configure(&mut self) -> Result<(), EncoderError> {
        match self.state {
            PipelineState::Idle => {}
            PipelineState::Closed => return Err(EncoderError::NotRunning("closed")),
            _ => return Ok(()),
        }

        let global_header = self.muxer.wants_global_header();
        if let Err(e) = self.encoder.configure(&self.metadata, global_header) {
            self.muxer.release();
            self.state = PipelineState::Closed;
            return Err(e);
        }
        self.state = PipelineState::EncoderConfigured;
        log::debug!(
            "Pipeline configured for {}x{} @ {} fps",
            self.metadata.width,
            self.metadata.height,
            self.metadata.fps
        );
        Ok(())
    }

    pub fn with_end_of_stream_poll_limit(mut self, polls: usize) -> Self {
        self.end_of_stream_poll_limit = polls.max(1);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Frames the encoder accepted.
    pub fn frames_fed(&self) -> u64 {
        self.frames_fed
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn has_written_any_sample(&self) -> bool {
        self.has_written_any_sample
    }

    pub fn is_closed(&self) -> bool {
        self.state == PipelineState::Closed
    }

    /// Queues one frame (blocking until the encoder has room) and writes
    /// whatever output is ready without waiting for more.
    pub fn feed(&mut self, frame: &RawFrame) -> Result<(), FeedError> {
        match self.state {
            PipelineState::Idle => return Err(FeedError::NotConfigured),
            PipelineState::Finalizing | PipelineState::Closed => return Err(FeedError::Closed),
            PipelineState::EncoderConfigured | PipelineState::EncoderRunning => {}
        }
        if frame.width() != self.metadata.width
            || frame.height() != self.metadata.height
            || !frame.is_well_sized()
        {
            return Err(FeedError::SizeMismatch {
                expected_width: self.metadata.width,
                expected_height: self.metadata.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
                actual_len: frame.data().len(),
            });
        }

        if !self.encoder_started {
            self.encoder.start().map_err(FeedError::Start)?;
            self.encoder_started = true;
            self.state = PipelineState::EncoderRunning;
        }

        let pts_us = pts_for_frame(self.frames_fed, self.metadata.fps);
        self.encoder
            .queue_input(EncoderInput::Frame {
                data: frame.data(),
                pts_us,
            })
            .map_err(FeedError::Queue)?;
        self.frames_fed += 1;
        log::debug!("Frame {} queued at {pts_us}us", self.frames_fed - 1);

        self.drain()?;
        Ok(())
    }

    /// Moves every ready sample into the container. Never waits.
    pub fn drain(&mut self) -> Result<(), DrainError> {
        if !self.encoder_started {
            return Ok(());
        }
        loop {
            match self.encoder.poll_output()? {
                EncoderOutput::Sample(sample) => self.write_sample(&sample)?,
                EncoderOutput::Pending | EncoderOutput::EndOfStream => return Ok(()),
            }
        }
    }

    /// Flushes the encoder and closes both ends. Calling it again is a no-op.
    ///
    /// Every cleanup step runs even when an earlier one fails; the failures
    /// are returned together.
    pub fn flush_and_close(&mut self) -> Result<(), FinalizeError> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.state = PipelineState::Finalizing;
        let mut failures = Vec::new();

        if self.encoder_started && self.frames_fed > 0 {
            let pts_us = pts_for_frame(self.frames_fed, self.metadata.fps);
            match self.encoder.queue_input(EncoderInput::EndOfStream { pts_us }) {
                Ok(()) => {
                    if let Err(e) = self.drain_until_end() {
                        failures.push(e);
                    }
                }
                Err(e) => failures.push(FinalizeError::EndOfStream(e)),
            }
        }

        if self.encoder_started {
            if let Err(e) = self.encoder.release() {
                failures.push(FinalizeError::ReleaseEncoder(e));
            }
        }
        if self.muxer_started {
            if let Err(e) = self.muxer.stop() {
                failures.push(FinalizeError::StopMuxer(e));
            }
        }
        self.muxer.release();
        self.state = PipelineState::Closed;

        log::info!(
            "Pipeline closed: {} frames fed, {} samples written",
            self.frames_fed,
            self.samples_written
        );
        match FinalizeError::from_failures(failures) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn drain_until_end(&mut self) -> Result<(), FinalizeError> {
        let mut idle_polls = 0;
        loop {
            match self.encoder.poll_output() {
                Ok(EncoderOutput::Sample(sample)) => {
                    idle_polls = 0;
                    self.write_sample(&sample).map_err(FinalizeError::Drain)?;
                }
                Ok(EncoderOutput::EndOfStream) => return Ok(()),
                Ok(EncoderOutput::Pending) => {
                    idle_polls += 1;
                    if idle_polls >= self.end_of_stream_poll_limit {
                        log::warn!("Encoder still busy after {idle_polls} polls, giving up on flush");
                        return Err(FinalizeError::FlushTimedOut { polls: idle_polls });
                    }
                    std::thread::sleep(Duration::from_millis(END_OF_STREAM_POLL_INTERVAL_MS));
                }
                Err(e) => return Err(FinalizeError::Drain(e.into())),
            }
        }
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> Result<(), DrainError> {
        let track = match self.track_index {
            Some(track) => track,
            None => {
                let format = self.encoder.output_format()?;
                let track = self.muxer.add_track(&format)?;
                self.track_index = Some(track);
                self.muxer.start()?;
                self.muxer_started = true;
                log::info!("Muxer started with {} track", format.mime);
                track
            }
        };
        if !self.muxer_started {
            return Err(MuxerError::InvalidState("muxer failed to start").into());
        }

        self.muxer.write_sample(track, sample)?;
        self.samples_written += 1;
        self.has_written_any_sample = true;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::container_muxer::{ContainerMuxer, MuxerError};
    use crate::video::domain::video_encoder::{
        EncodedSample, EncoderError, EncoderInput, EncoderOutput, StreamFormat, VideoEncoder,
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Event {
        Configure { global_header: bool },
        Start,
        /// `first_byte` identifies synthetic frames filled with one value.
        Queue { pts_us: i64, first_byte: u8 },
        EndOfStream { pts_us: i64 },
        ReleaseEncoder,
        AddTrack,
        StartMuxer,
        Write { pts_us: i64 },
        StopMuxer,
        ReleaseMuxer,
    }

    pub type EventLog = Arc<Mutex<Vec<Event>>>;

    /// Emits one sample per accepted frame, then end of stream after the marker.
    pub struct StubEncoder {
        pub events: EventLog,
        pub fail_configure: bool,
        /// Zero-based attempt numbers whose queue call fails.
        pub fail_queue_attempts: HashSet<usize>,
        pub produce_samples: bool,
        pub never_finish: bool,
        pub fail_release: bool,
        attempts: usize,
        ready: VecDeque<EncodedSample>,
        end_queued: bool,
    }

    impl StubEncoder {
        pub fn new(events: EventLog) -> Self {
            Self {
                events,
                fail_configure: false,
                fail_queue_attempts: HashSet::new(),
                produce_samples: true,
                never_finish: false,
                fail_release: false,
                attempts: 0,
                ready: VecDeque::new(),
                end_queued: false,
            }
        }

        fn log(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl VideoEncoder for StubEncoder {
        fn configure(
            &mut self,
            _metadata: &VideoMetadata,
            global_header: bool,
        ) -> Result<(), EncoderError> {
            if self.fail_configure {
                return Err(EncoderError::Configure("stub refuses".into()));
            }
            self.log(Event::Configure { global_header });
            Ok(())
        }

        fn start(&mut self) -> Result<(), EncoderError> {
            self.log(Event::Start);
            Ok(())
        }

        fn queue_input(&mut self, input: EncoderInput<'_>) -> Result<(), EncoderError> {
            match input {
                EncoderInput::Frame { data, pts_us } => {
                    let attempt = self.attempts;
                    self.attempts += 1;
                    if self.fail_queue_attempts.contains(&attempt) {
                        return Err(EncoderError::Backend("stub queue failure".into()));
                    }
                    self.log(Event::Queue {
                        pts_us,
                        first_byte: data.first().copied().unwrap_or(0),
                    });
                    if self.produce_samples {
                        self.ready.push_back(EncodedSample {
                            data: vec![1, 2, 3],
                            pts_us,
                            dts_us: None,
                            is_keyframe: attempt == 0,
                        });
                    }
                }
                EncoderInput::EndOfStream { pts_us } => {
                    self.log(Event::EndOfStream { pts_us });
                    self.end_queued = true;
                }
            }
            Ok(())
        }

        fn poll_output(&mut self) -> Result<EncoderOutput, EncoderError> {
            if let Some(sample) = self.ready.pop_front() {
                return Ok(EncoderOutput::Sample(sample));
            }
            if self.end_queued && !self.never_finish {
                return Ok(EncoderOutput::EndOfStream);
            }
            Ok(EncoderOutput::Pending)
        }

        fn output_format(&self) -> Result<StreamFormat, EncoderError> {
            Ok(StreamFormat {
                mime: "video/avc".into(),
                width: 4,
                height: 4,
                fps: 30,
                bit_rate: 16,
                extradata: Vec::new(),
            })
        }

        fn release(&mut self) -> Result<(), EncoderError> {
            self.log(Event::ReleaseEncoder);
            if self.fail_release {
                return Err(EncoderError::Backend("stub release failure".into()));
            }
            Ok(())
        }
    }

    pub struct StubMuxer {
        pub events: EventLog,
        pub fail_stop: bool,
        pub global_header: bool,
    }

    impl StubMuxer {
        pub fn new(events: EventLog) -> Self {
            Self {
                events,
                fail_stop: false,
                global_header: true,
            }
        }

        fn log(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ContainerMuxer for StubMuxer {
        fn add_track(&mut self, _format: &StreamFormat) -> Result<usize, MuxerError> {
            self.log(Event::AddTrack);
            Ok(0)
        }

        fn start(&mut self) -> Result<(), MuxerError> {
            self.log(Event::StartMuxer);
            Ok(())
        }

        fn write_sample(&mut self, _track: usize, sample: &EncodedSample) -> Result<(), MuxerError> {
            self.log(Event::Write {
                pts_us: sample.pts_us,
            });
            Ok(())
        }

        fn stop(&mut self) -> Result<(), MuxerError> {
            self.log(Event::StopMuxer);
            if self.fail_stop {
                return Err(MuxerError::Backend("stub stop failure".into()));
            }
            Ok(())
        }

        fn release(&mut self) {
            self.log(Event::ReleaseMuxer);
        }

        fn wants_global_header(&self) -> bool {
            self.global_header
        }
    }

    pub fn events_of(log: &EventLog) -> Vec<Event> {
        log.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::{Arc, Mutex};

    fn metadata() -> VideoMetadata {
        VideoMetadata::new(4, 4, 30)
    }

    fn frame() -> RawFrame {
        RawFrame::filled(4, 4, 9)
    }

    fn pipeline_with(
        configure: impl FnOnce(&mut StubEncoder, &mut StubMuxer),
    ) -> (EncodeMuxPipeline, EventLog) {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut encoder = StubEncoder::new(events.clone());
        let mut muxer = StubMuxer::new(events.clone());
        configure(&mut encoder, &mut muxer);
        let mut pipeline = EncodeMuxPipeline::new(Box::new(encoder), Box::new(muxer), metadata());
        pipeline.configure().unwrap();
        (pipeline, events)
    }

    fn queued_pts(events: &[Event]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Queue { pts_us, .. } => Some(*pts_us),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pts_for_frame_truncates() {
        assert_eq!(pts_for_frame(0, 30), 0);
        assert_eq!(pts_for_frame(1, 30), 33_333);
        assert_eq!(pts_for_frame(2, 30), 66_666);
        assert_eq!(pts_for_frame(3, 30), 100_000);
        assert_eq!(pts_for_frame(7, 0), 7_000_000);
    }

    #[test]
    fn test_configures_eagerly_and_starts_lazily() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        assert_eq!(pipeline.state(), PipelineState::EncoderConfigured);
        assert_eq!(
            events_of(&events),
            vec![Event::Configure {
                global_header: true
            }]
        );

        pipeline.feed(&frame()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::EncoderRunning);
        assert_eq!(events_of(&events)[1], Event::Start);
    }

    #[test]
    fn test_configure_failure_releases_muxer() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut encoder = StubEncoder::new(events.clone());
        encoder.fail_configure = true;
        let mut pipeline = EncodeMuxPipeline::new(
            Box::new(encoder),
            Box::new(StubMuxer::new(events.clone())),
            metadata(),
        );

        assert!(matches!(pipeline.configure(), Err(EncoderError::Configure(_))));
        assert_eq!(events_of(&events), vec![Event::ReleaseMuxer]);
        assert!(pipeline.is_closed());
        assert!(matches!(pipeline.configure(), Err(EncoderError::NotRunning(_))));
    }

    #[test]
    fn test_new_pipeline_is_idle_until_configured() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = EncodeMuxPipeline::new(
            Box::new(StubEncoder::new(events.clone())),
            Box::new(StubMuxer::new(events.clone())),
            metadata(),
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(matches!(pipeline.feed(&frame()), Err(FeedError::NotConfigured)));
        assert!(events_of(&events).is_empty());

        pipeline.configure().unwrap();
        pipeline.configure().unwrap();
        assert_eq!(pipeline.state(), PipelineState::EncoderConfigured);
        assert_eq!(
            events_of(&events),
            vec![Event::Configure {
                global_header: true
            }]
        );
    }

    #[test]
    fn test_close_while_idle_only_releases_muxer() {
        let events: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = EncodeMuxPipeline::new(
            Box::new(StubEncoder::new(events.clone())),
            Box::new(StubMuxer::new(events.clone())),
            metadata(),
        );
        pipeline.flush_and_close().unwrap();
        assert_eq!(events_of(&events), vec![Event::ReleaseMuxer]);
        assert!(pipeline.is_closed());
    }

    #[test]
    fn test_timestamps_follow_frame_count() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        for _ in 0..5 {
            pipeline.feed(&frame()).unwrap();
        }
        pipeline.flush_and_close().unwrap();

        let events = events_of(&events);
        assert_eq!(
            queued_pts(&events),
            vec![0, 33_333, 66_666, 100_000, 133_333]
        );
        assert!(events.contains(&Event::EndOfStream { pts_us: 166_666 }));
    }

    #[test]
    fn test_failed_queue_does_not_consume_timestamp() {
        let (mut pipeline, events) = pipeline_with(|encoder, _| {
            encoder.fail_queue_attempts.insert(1);
        });
        pipeline.feed(&frame()).unwrap();
        assert!(matches!(pipeline.feed(&frame()), Err(FeedError::Queue(_))));
        pipeline.feed(&frame()).unwrap();

        assert_eq!(pipeline.frames_fed(), 2);
        assert_eq!(queued_pts(&events_of(&events)), vec![0, 33_333]);
    }

    #[test]
    fn test_first_sample_adds_track_and_starts_muxer_once() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        for _ in 0..3 {
            pipeline.feed(&frame()).unwrap();
        }
        pipeline.flush_and_close().unwrap();

        let events = events_of(&events);
        let count = |wanted: &Event| events.iter().filter(|e| *e == wanted).count();
        assert_eq!(count(&Event::AddTrack), 1);
        assert_eq!(count(&Event::StartMuxer), 1);
        let add = events.iter().position(|e| *e == Event::AddTrack).unwrap();
        let first_write = events
            .iter()
            .position(|e| matches!(e, Event::Write { .. }))
            .unwrap();
        assert_eq!(events[add + 1], Event::StartMuxer);
        assert!(add < first_write);
        assert_eq!(pipeline.samples_written(), 3);
        assert!(pipeline.has_written_any_sample());
    }

    #[test]
    fn test_close_order_is_encoder_then_muxer() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        pipeline.feed(&frame()).unwrap();
        pipeline.flush_and_close().unwrap();

        let events = events_of(&events);
        let tail = &events[events.len() - 3..];
        assert_eq!(
            tail,
            [Event::ReleaseEncoder, Event::StopMuxer, Event::ReleaseMuxer]
        );
        assert_eq!(pipeline.state(), PipelineState::Closed);
    }

    #[test]
    fn test_close_without_frames_skips_end_of_stream() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        pipeline.flush_and_close().unwrap();

        assert_eq!(
            events_of(&events),
            vec![
                Event::Configure {
                    global_header: true
                },
                Event::ReleaseMuxer
            ]
        );
        assert!(!pipeline.has_written_any_sample());
    }

    #[test]
    fn test_no_output_means_muxer_never_started() {
        let (mut pipeline, events) = pipeline_with(|encoder, _| {
            encoder.produce_samples = false;
        });
        pipeline.feed(&frame()).unwrap();
        pipeline.flush_and_close().unwrap();

        let events = events_of(&events);
        assert!(!events.contains(&Event::AddTrack));
        assert!(!events.contains(&Event::StopMuxer));
        assert_eq!(events.last(), Some(&Event::ReleaseMuxer));
        assert!(!pipeline.has_written_any_sample());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        pipeline.feed(&frame()).unwrap();
        pipeline.flush_and_close().unwrap();
        let after_first = events_of(&events).len();

        pipeline.flush_and_close().unwrap();
        assert_eq!(events_of(&events).len(), after_first);
    }

    #[test]
    fn test_muxer_stop_failure_still_releases_everything() {
        let (mut pipeline, events) = pipeline_with(|_, muxer| {
            muxer.fail_stop = true;
        });
        pipeline.feed(&frame()).unwrap();

        let err = pipeline.flush_and_close().unwrap_err();
        assert!(matches!(err, FinalizeError::StopMuxer(_)));
        let events = events_of(&events);
        assert!(events.contains(&Event::ReleaseEncoder));
        assert_eq!(events.last(), Some(&Event::ReleaseMuxer));
    }

    #[test]
    fn test_encoder_release_failure_does_not_block_muxer() {
        let (mut pipeline, events) = pipeline_with(|encoder, muxer| {
            encoder.fail_release = true;
            muxer.fail_stop = true;
        });
        pipeline.feed(&frame()).unwrap();

        let err = pipeline.flush_and_close().unwrap_err();
        assert!(matches!(err, FinalizeError::Multiple(ref all) if all.len() == 2));
        let events = events_of(&events);
        assert!(events.contains(&Event::StopMuxer));
        assert_eq!(events.last(), Some(&Event::ReleaseMuxer));
    }

    #[test]
    fn test_flush_gives_up_on_stuck_encoder() {
        let (pipeline, events) = pipeline_with(|encoder, _| {
            encoder.never_finish = true;
        });
        let mut pipeline = pipeline.with_end_of_stream_poll_limit(3);
        pipeline.feed(&frame()).unwrap();

        let err = pipeline.flush_and_close().unwrap_err();
        assert!(matches!(err, FinalizeError::FlushTimedOut { polls: 3 }));
        assert_eq!(events_of(&events).last(), Some(&Event::ReleaseMuxer));
        assert!(pipeline.is_closed());
    }

    #[test]
    fn test_feed_after_close_is_rejected() {
        let (mut pipeline, _) = pipeline_with(|_, _| {});
        pipeline.flush_and_close().unwrap();
        assert!(matches!(pipeline.feed(&frame()), Err(FeedError::Closed)));
    }

    #[test]
    fn test_wrong_size_frame_is_rejected_without_starting() {
        let (mut pipeline, events) = pipeline_with(|_, _| {});
        let result = pipeline.feed(&RawFrame::filled(8, 8, 0));
        assert!(matches!(result, Err(FeedError::SizeMismatch { .. })));
        assert_eq!(pipeline.frames_fed(), 0);
        assert!(!events_of(&events).contains(&Event::Start));
    }
}
