use std::collections::BTreeMap;
use std::time::Instant;

/// Observer for clip-writing events.
///
/// The writer reports what it does through this port so a CLI can print
/// progress and a summary while library callers stay silent.
pub trait PipelineLogger: Send {
    /// Called after each frame of the window is handled (fed or dropped).
    fn progress(&mut self, current: usize, total: usize);

    /// How long one step took for one frame (`read`, `encode`, ...).
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time measurement, e.g. encoded sample size.
    fn metric(&mut self, name: &str, value: f64);

    /// A frame of the window that did not reach the encoder.
    fn dropped(&mut self, index: u64, reason: &str);

    fn info(&mut self, message: &str);

    /// End-of-clip report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. The default for library callers and tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn dropped(&mut self, _index: u64, _reason: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// Logs throttled progress through `log::info!` and keeps per-step timings
/// for a summary once the clip is done.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, Vec<f64>>,
    metrics: BTreeMap<String, Vec<f64>>,
    dropped: Vec<(u64, String)>,
    start_time: Instant,
    frames_seen: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            dropped: Vec::new(),
            start_time: Instant::now(),
            frames_seen: 0,
        }
    }

    /// The formatted report, or `None` before any frame was handled.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames_seen == 0 && self.dropped.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Clip summary ({} frames, {} dropped, {:.1}s):",
            self.frames_seen,
            self.dropped.len(),
            elapsed_ms / 1000.0
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:8}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }
        for (name, values) in &self.metrics {
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }
        for (index, reason) in &self.dropped {
            lines.push(format!("  dropped frame {index}: {reason}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn dropped_indices(&self) -> Vec<u64> {
        self.dropped.iter().map(|(index, _)| *index).collect()
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.frames_seen = current;
        if total > 0 && (current % self.throttle_frames == 0 || current == total) {
            log::info!("Encoding clip: {current}/{total} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn dropped(&mut self, index: u64, reason: &str) {
        log::warn!("Frame {index} dropped: {reason}");
        self.dropped.push((index, reason.to_string()));
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
