use std::collections::HashMap;
use std::time::Instant;

/// Stage name for network inference.
pub const FORWARD_PASS: &str = "forward_pass";
/// Stage name for post-processing (decode, filter, suppress).
pub const MISC: &str = "misc";
/// Per-frame count of detections in the final set.
pub const DETECTIONS: &str = "detections";

/// Observer for pipeline orchestration events.
///
/// Keeps the use case independent of where status goes (stdout, log crate,
/// nowhere in tests).
pub trait PipelineLogger: Send {
    /// Called once per finished frame. `total` is `None` for live sources.
    fn progress(&mut self, current: usize, total: Option<usize>);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a per-frame metric such as the detection count.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards every event.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: Option<usize>) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running total and sample count for one stage or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningStats {
    pub total: f64,
    pub count: usize,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Logs a running `im_detect` line per frame and a summary at the end.
///
/// The per-frame line reports the running average of the `forward_pass` and
/// `misc` stages in seconds. Output is throttled to every `throttle_frames`
/// frames. Only aggregates are kept, so an endless camera feed runs in
/// constant memory.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: HashMap<String, RunningStats>,
    metrics: HashMap<String, RunningStats>,
    start_time: Instant,
    frames: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Running mean of a stage in milliseconds, 0 when never recorded.
    pub fn average_ms(&self, stage: &str) -> f64 {
        self.timings.get(stage).map_or(0.0, RunningStats::mean)
    }

    pub fn timings_for(&self, stage: &str) -> Option<RunningStats> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<RunningStats> {
        self.metrics.get(name).copied()
    }

    /// The status line printed after frame `current` (1-based).
    pub fn status_line(&self, current: usize, total: Option<usize>) -> String {
        let position = match total {
            Some(total) => format!("{current}/{total}"),
            None => current.to_string(),
        };
        format!(
            "im_detect: {position} forward_pass_time: {:.4}s misc: {:.4}s",
            self.average_ms(FORWARD_PASS) / 1000.0,
            self.average_ms(MISC) / 1000.0
        )
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames;
        let mut lines = vec![format!(
            "Pipeline summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let stats = self.timings[stage];
            let total_ms = stats.total;
            let pct = if elapsed_ms > 0.0 {
                total_ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  total {total_ms:7.0}ms  ({pct:4.1}%)",
                stats.mean()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.1}", self.metrics[name].mean()));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: Option<usize>) {
        self.frames = current;
        if current % self.throttle_frames == 0 || Some(current) == total {
            log::info!("{}", self.status_line(current, total));
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

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
