use tracing::{debug, info};

use crate::frame::FrameBuffer;
use crate::ranking::ClassPrediction;

/// Panel status as surfaced to the user. The badge is the only place
/// faults become visible; nothing propagates past the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBadge {
    Loading,
    Ready,
    Demo,
    Denied,
    Error,
}

impl StatusBadge {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusBadge::Loading => "loading",
            StatusBadge::Ready => "ready",
            StatusBadge::Demo => "demo",
            StatusBadge::Denied => "denied",
            StatusBadge::Error => "error",
        }
    }
}

/// Drawing and status sink a panel renders into. Implementations are
/// expected to be cheap; the preview path calls into this every
/// scheduler pass.
pub trait RenderSink: Send {
    fn set_status(&mut self, badge: StatusBadge);
    fn show_top1(&mut self, label: &str, probability: f32);
    fn show_top_k(&mut self, entries: &[ClassPrediction]);
    fn show_latency(&mut self, millis: u64);
    /// Blit the raw capture frame (camera preview or uploaded still).
    fn draw_frame(&mut self, frame: &FrameBuffer);
    /// Reset the overlay layer to the given dimensions.
    fn clear_overlay(&mut self, width: u32, height: u32);
    fn draw_circle(&mut self, x: f32, y: f32, radius: f32);
    fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32);
    /// Oscilloscope-style polyline over normalized samples in [-1, 1].
    fn draw_trace(&mut self, samples: &[f32]);
}

/// Headless sink that narrates renders through tracing. Used by the
/// binary so panels can run without a display attached.
#[derive(Debug, Default)]
pub struct LogSink {
    panel: String,
}

impl LogSink {
    pub fn new(panel: impl Into<String>) -> Self {
        Self {
            panel: panel.into(),
        }
    }
}

impl RenderSink for LogSink {
    fn set_status(&mut self, badge: StatusBadge) {
        info!("[{}] status: {}", self.panel, badge.as_str());
    }

    fn show_top1(&mut self, label: &str, probability: f32) {
        info!("[{}] top-1: {} ({:.2})", self.panel, label, probability);
    }

    fn show_top_k(&mut self, entries: &[ClassPrediction]) {
        for (i, entry) in entries.iter().enumerate() {
            debug!(
                "[{}]   #{} {} ({:.2})",
                self.panel,
                i + 1,
                entry.label,
                entry.probability
            );
        }
    }

    fn show_latency(&mut self, millis: u64) {
        debug!("[{}] latency: {}ms", self.panel, millis);
    }

    fn draw_frame(&mut self, frame: &FrameBuffer) {
        debug!(
            "[{}] preview frame {}x{}",
            self.panel, frame.width, frame.height
        );
    }

    fn clear_overlay(&mut self, _width: u32, _height: u32) {}

    fn draw_circle(&mut self, _x: f32, _y: f32, _radius: f32) {}

    fn draw_line(&mut self, _x0: f32, _y0: f32, _x1: f32, _y1: f32) {}

    fn draw_trace(&mut self, samples: &[f32]) {
        debug!("[{}] trace of {} samples", self.panel, samples.len());
    }
}

/// Sink that records every call for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub statuses: Vec<StatusBadge>,
    pub top1: Vec<(String, f32)>,
    pub top_k: Vec<Vec<ClassPrediction>>,
    pub latencies: Vec<u64>,
    pub frames_drawn: usize,
    pub overlay_clears: usize,
    pub circles: Vec<(f32, f32, f32)>,
    pub lines: Vec<(f32, f32, f32, f32)>,
    pub traces: Vec<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<StatusBadge> {
        self.statuses.last().copied()
    }

    pub fn last_top1(&self) -> Option<&(String, f32)> {
        self.top1.last()
    }
}

impl RenderSink for RecordingSink {
    fn set_status(&mut self, badge: StatusBadge) {
        self.statuses.push(badge);
    }

    fn show_top1(&mut self, label: &str, probability: f32) {
        self.top1.push((label.to_string(), probability));
    }

    fn show_top_k(&mut self, entries: &[ClassPrediction]) {
        self.top_k.push(entries.to_vec());
    }

    fn show_latency(&mut self, millis: u64) {
        self.latencies.push(millis);
    }

    fn draw_frame(&mut self, _frame: &FrameBuffer) {
        self.frames_drawn += 1;
    }

    fn clear_overlay(&mut self, _width: u32, _height: u32) {
        self.overlay_clears += 1;
    }

    fn draw_circle(&mut self, x: f32, y: f32, radius: f32) {
        self.circles.push((x, y, radius));
    }

    fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32) {
        self.lines.push((x0, y0, x1, y1));
    }

    fn draw_trace(&mut self, samples: &[f32]) {
        self.traces.push(samples.len());
    }
}
