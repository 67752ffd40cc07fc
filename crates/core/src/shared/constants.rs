pub const MICROS_PER_SECOND: i64 = 1_000_000;

pub const DEFAULT_FPS: u32 = 30;

/// Seconds between forced key frames.
pub const DEFAULT_KEYFRAME_INTERVAL_SECS: u32 = 1;

/// Size of the `[width][height]` prefix in front of every scratch record.
pub const RECORD_HEADER_LEN: usize = 8;

pub const SCRATCH_DIR_NAME: &str = "temp_frames";
pub const FRAME_FILE_PREFIX: &str = "frame_";
pub const FRAME_FILE_EXTENSION: &str = "yuv";

pub const CONTAINER_MIME: &str = "video/mp4";
pub const THUMBNAIL_SUFFIX: &str = "_thumb.jpg";

/// Idle polls tolerated while waiting for the encoder to flush after end of stream.
pub const MAX_END_OF_STREAM_IDLE_POLLS: usize = 2000;

/// Pause between idle polls during the end-of-stream drain.
pub const END_OF_STREAM_POLL_INTERVAL_MS: u64 = 5;
