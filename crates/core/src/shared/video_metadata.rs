use super::constants::{DEFAULT_FPS, DEFAULT_KEYFRAME_INTERVAL_SECS};

/// Geometry and rate settings for one output clip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bit rate in bits per second.
    pub bit_rate: u64,
    pub keyframe_interval_secs: u32,
}

impl VideoMetadata {
    /// Bit rate defaults to one bit per pixel per second.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bit_rate: u64::from(width) * u64::from(height),
            keyframe_interval_secs: DEFAULT_KEYFRAME_INTERVAL_SECS,
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u64) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    pub fn with_keyframe_interval(mut self, secs: u32) -> Self {
        self.keyframe_interval_secs = secs;
        self
    }

    /// Frames between key frames, never less than one.
    pub fn gop_size(&self) -> u32 {
        (self.fps * self.keyframe_interval_secs).max(1)
    }

    /// 4:2:0 subsampling needs even dimensions; the rate must be positive.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "frame dimensions must be positive, got {}x{}",
                self.width, self.height
            ));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(format!(
                "frame dimensions must be even for 4:2:0 input, got {}x{}",
                self.width, self.height
            ));
        }
        if self.fps == 0 {
            return Err("fps must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self::new(640, 480, DEFAULT_FPS)
    }
}
