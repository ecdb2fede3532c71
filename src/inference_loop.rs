use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::ranking::{rank, ClassPrediction, LatencyMeter, RankedResult};
use crate::render::{RenderSink, StatusBadge};

/// How many ranked entries the display consumes.
pub const TOP_K: usize = 3;

/// What is driving the loop. `Demo` is only enterable before the loop
/// starts (a failed load). Once running, the demotions are
/// `Live -> Error` (repeated inference failures) and `Demo -> Denied`
/// (the demo oscilloscope still needs the microphone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Live,
    Demo,
    Denied,
    Error,
}

impl LoopMode {
    pub fn can_transition(self, next: LoopMode) -> bool {
        match (self, next) {
            (a, b) if a == b => true,
            (LoopMode::Live, LoopMode::Error) => true,
            (LoopMode::Demo, LoopMode::Denied) => true,
            _ => false,
        }
    }
}

/// Target inter-cycle interval derived from the user-facing FPS
/// control. Governs pacing only, not hard real-time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameBudget {
    interval: Duration,
}

impl FrameBudget {
    pub fn from_fps(fps: f32) -> Self {
        let fps = fps.max(1.0);
        Self {
            interval: Duration::from_secs_f64(1.0 / fps as f64),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug)]
struct ControlsInner {
    frozen: AtomicBool,
    cancelled: AtomicBool,
    fps_bits: AtomicU32,
}

/// Shared handle for the panel's user controls: freeze toggle, FPS
/// slider, and teardown. Adjusting FPS never restarts the loop or the
/// capture device; the new budget applies from the next pass.
#[derive(Debug, Clone)]
pub struct LoopControls {
    inner: Arc<ControlsInner>,
}

impl LoopControls {
    pub fn new(fps: f32) -> Self {
        Self {
            inner: Arc::new(ControlsInner {
                frozen: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                fps_bits: AtomicU32::new(fps.to_bits()),
            }),
        }
    }

    pub fn set_fps(&self, fps: f32) {
        self.inner.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    pub fn fps(&self) -> f32 {
        f32::from_bits(self.inner.fps_bits.load(Ordering::Relaxed))
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.inner.frozen.store(frozen, Ordering::Relaxed);
    }

    pub fn toggle_frozen(&self) -> bool {
        let was = self.inner.frozen.fetch_xor(true, Ordering::Relaxed);
        !was
    }

    pub fn frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }
}

/// Panel-specific body of one loop pass. The loop owns pacing, mode,
/// ranking, latency and the failure policy; the body owns capture
/// access, model calls and modality-specific overlay drawing.
#[async_trait(?Send)]
pub trait CycleBody {
    /// Unthrottled raw-capture draw; runs every scheduler pass so the
    /// preview stays smooth regardless of inference cost.
    fn draw_preview(&mut self, sink: &mut dyn RenderSink) -> Result<()>;

    /// One classification pass against the live session.
    async fn classify_live(&mut self, sink: &mut dyn RenderSink) -> Result<Vec<ClassPrediction>>;

    /// One synthetic pass for demo mode.
    fn classify_demo(
        &mut self,
        now_secs: f64,
        sink: &mut dyn RenderSink,
    ) -> Result<Vec<ClassPrediction>>;
}

pub fn wall_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Paced capture → inference → rank → render driver for one panel.
pub struct InferenceLoop {
    mode: LoopMode,
    controls: LoopControls,
    meter: LatencyMeter,
    refresh_interval: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    last_tick: Option<Instant>,
    last_result: Option<RankedResult>,
}

impl InferenceLoop {
    pub fn new(
        mode: LoopMode,
        controls: LoopControls,
        refresh_hz: u32,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            mode,
            controls,
            meter: LatencyMeter::new(),
            refresh_interval: Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64),
            max_consecutive_failures,
            consecutive_failures: 0,
            last_tick: None,
            last_result: None,
        }
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn last_result(&self) -> Option<&RankedResult> {
        self.last_result.as_ref()
    }

    pub fn last_latency_ms(&self) -> Option<u64> {
        self.meter.last_ms()
    }

    /// Drives the loop until the controls are cancelled. In `Denied`
    /// mode no tick is ever scheduled and the preview stays blank.
    pub async fn run(&mut self, body: &mut dyn CycleBody, sink: &mut dyn RenderSink) -> Result<()> {
        if self.mode == LoopMode::Denied {
            debug!("Loop not started: capture denied");
            return Ok(());
        }

        let mut passes: u64 = 0;
        loop {
            if self.controls.cancelled() {
                break;
            }

            if let Err(e) = body.draw_preview(sink) {
                debug!("Preview draw skipped: {}", e);
            }

            let budget = FrameBudget::from_fps(self.controls.fps());
            let now = Instant::now();
            let due = self
                .last_tick
                .map_or(true, |last| now.duration_since(last) >= budget.interval());

            if due {
                self.last_tick = Some(now);
                // Freeze suspends classification only; the previous
                // result and latency stay on screen untouched.
                if !self.controls.frozen() {
                    self.run_cycle(body, sink).await;
                }
            }

            passes += 1;
            if passes % 600 == 0 {
                debug!("Scheduler alive after {} passes (mode {:?})", passes, self.mode);
            }
            tokio::time::sleep(self.refresh_interval).await;
        }

        debug!("Loop cancelled after {} scheduler passes", passes);
        Ok(())
    }

    /// One unconditional cycle, bypassing pacing, the freeze flag, and
    /// the loop's own mode. Used for single-shot classification of an
    /// uploaded still, which works even when the camera was denied.
    pub async fn classify_once(
        &mut self,
        mode: LoopMode,
        body: &mut dyn CycleBody,
        sink: &mut dyn RenderSink,
    ) {
        self.run_cycle_in(mode, body, sink).await;
    }

    async fn run_cycle(&mut self, body: &mut dyn CycleBody, sink: &mut dyn RenderSink) {
        let mode = self.mode;
        self.run_cycle_in(mode, body, sink).await;
    }

    async fn run_cycle_in(
        &mut self,
        mode: LoopMode,
        body: &mut dyn CycleBody,
        sink: &mut dyn RenderSink,
    ) {
        let outcome = match mode {
            LoopMode::Live => {
                self.meter.start();
                body.classify_live(sink).await
            }
            LoopMode::Demo => {
                self.meter.start();
                body.classify_demo(wall_secs(), sink)
            }
            LoopMode::Denied | LoopMode::Error => return,
        };

        match outcome {
            Ok(predictions) => {
                self.consecutive_failures = 0;
                let ranked = rank(predictions);
                if let Some(top) = ranked.top1() {
                    sink.show_top1(&top.label, top.probability);
                }
                sink.show_top_k(ranked.top_k(TOP_K));
                let millis = self.meter.stop();
                sink.show_latency(millis);
                self.last_result = Some(ranked);
            }
            Err(e) => {
                // Skip-and-continue: this cycle's render is dropped and
                // the previous results remain on screen.
                warn!("Inference cycle failed: {}", e);
                self.meter.stop();
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.max_consecutive_failures
                    && self.mode.can_transition(LoopMode::Error)
                {
                    error!(
                        "{} consecutive inference failures, demoting loop to error state",
                        self.consecutive_failures
                    );
                    self.mode = LoopMode::Error;
                    sink.set_status(StatusBadge::Error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RecordingSink;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedBody {
        previews: Arc<AtomicUsize>,
        cycles: Arc<AtomicUsize>,
        /// 1-based cycle numbers that should fail.
        failing_cycles: Vec<usize>,
        fail_all: bool,
    }

    impl ScriptedBody {
        fn new() -> Self {
            Self {
                previews: Arc::new(AtomicUsize::new(0)),
                cycles: Arc::new(AtomicUsize::new(0)),
                failing_cycles: Vec::new(),
                fail_all: false,
            }
        }

        fn predictions(cycle: usize) -> Vec<ClassPrediction> {
            vec![
                ClassPrediction::new(format!("cycle-{}", cycle), 0.8),
                ClassPrediction::new("other", 0.2),
            ]
        }
    }

    #[async_trait(?Send)]
    impl CycleBody for ScriptedBody {
        fn draw_preview(&mut self, _sink: &mut dyn RenderSink) -> Result<()> {
            self.previews.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn classify_live(
            &mut self,
            _sink: &mut dyn RenderSink,
        ) -> Result<Vec<ClassPrediction>> {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_all || self.failing_cycles.contains(&cycle) {
                return Err(anyhow!("model exploded on cycle {}", cycle));
            }
            Ok(Self::predictions(cycle))
        }

        fn classify_demo(
            &mut self,
            _now_secs: f64,
            _sink: &mut dyn RenderSink,
        ) -> Result<Vec<ClassPrediction>> {
            let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Self::predictions(cycle))
        }
    }

    async fn run_for(
        mut loop_: InferenceLoop,
        body: &mut ScriptedBody,
        sink: &mut RecordingSink,
        millis: u64,
    ) -> InferenceLoop {
        let controls = loop_.controls.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            controls.cancel();
        });
        loop_.run(body, sink).await.unwrap();
        canceller.await.unwrap();
        loop_
    }

    #[test]
    fn frame_budget_tracks_fps() {
        assert_eq!(
            FrameBudget::from_fps(10.0).interval(),
            Duration::from_millis(100)
        );
        // Rates below 1 FPS clamp to one second.
        assert_eq!(
            FrameBudget::from_fps(0.0).interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn mode_transitions_are_guarded() {
        assert!(LoopMode::Live.can_transition(LoopMode::Error));
        assert!(LoopMode::Demo.can_transition(LoopMode::Demo));
        assert!(LoopMode::Demo.can_transition(LoopMode::Denied));
        assert!(!LoopMode::Live.can_transition(LoopMode::Demo));
        assert!(!LoopMode::Live.can_transition(LoopMode::Denied));
        assert!(!LoopMode::Denied.can_transition(LoopMode::Live));
        assert!(!LoopMode::Error.can_transition(LoopMode::Live));
        assert!(!LoopMode::Demo.can_transition(LoopMode::Live));
    }

    #[tokio::test]
    async fn denied_mode_never_schedules_a_tick() {
        let controls = LoopControls::new(30.0);
        let mut loop_ = InferenceLoop::new(LoopMode::Denied, controls, 1000, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();
        // Returns immediately without needing cancellation.
        loop_.run(&mut body, &mut sink).await.unwrap();
        assert_eq!(body.cycles.load(Ordering::SeqCst), 0);
        assert_eq!(body.previews.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn live_loop_renders_ranked_results() {
        let controls = LoopControls::new(500.0);
        let loop_ = InferenceLoop::new(LoopMode::Live, controls, 1000, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();
        let loop_ = run_for(loop_, &mut body, &mut sink, 80).await;

        assert!(body.cycles.load(Ordering::SeqCst) >= 2);
        assert!(!sink.top1.is_empty());
        assert_eq!(sink.top1.len(), sink.latencies.len());
        assert_eq!(sink.top_k.last().unwrap().len(), 2);
        assert!(loop_.last_result().is_some());
        assert_eq!(loop_.mode(), LoopMode::Live);
    }

    #[tokio::test]
    async fn freeze_suspends_classification_but_not_preview() {
        let controls = LoopControls::new(500.0);
        controls.set_frozen(true);
        let loop_ = InferenceLoop::new(LoopMode::Live, controls, 1000, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();
        run_for(loop_, &mut body, &mut sink, 60).await;

        assert_eq!(body.cycles.load(Ordering::SeqCst), 0);
        assert!(body.previews.load(Ordering::SeqCst) > 0);
        assert!(sink.top1.is_empty());
    }

    #[tokio::test]
    async fn single_failure_keeps_previous_render_and_loop_alive() {
        let controls = LoopControls::new(500.0);
        let loop_ = InferenceLoop::new(LoopMode::Live, controls, 1000, 5);
        let mut body = ScriptedBody::new();
        body.failing_cycles = vec![2];
        let mut sink = RecordingSink::new();
        let loop_ = run_for(loop_, &mut body, &mut sink, 80).await;

        // A third cycle ran despite the second failing.
        assert!(body.cycles.load(Ordering::SeqCst) >= 3);
        // Cycle 2 rendered nothing, so render count trails cycle count.
        assert!(sink.top1.len() < body.cycles.load(Ordering::SeqCst));
        assert!(sink.top1.iter().any(|(label, _)| label == "cycle-1"));
        assert_eq!(loop_.mode(), LoopMode::Live);
    }

    #[tokio::test]
    async fn repeated_failures_demote_live_to_error() {
        let controls = LoopControls::new(500.0);
        let loop_ = InferenceLoop::new(LoopMode::Live, controls, 1000, 3);
        let mut body = ScriptedBody::new();
        body.fail_all = true;
        let mut sink = RecordingSink::new();
        let loop_ = run_for(loop_, &mut body, &mut sink, 80).await;

        assert_eq!(loop_.mode(), LoopMode::Error);
        assert_eq!(sink.last_status(), Some(StatusBadge::Error));
        // Exactly the threshold number of cycles ran before demotion.
        assert_eq!(body.cycles.load(Ordering::SeqCst), 3);
        assert!(sink.top1.is_empty());
    }

    #[tokio::test]
    async fn fps_change_takes_effect_without_restart() {
        let controls = LoopControls::new(5.0);
        let handle = controls.clone();
        let loop_ = InferenceLoop::new(LoopMode::Demo, controls, 1000, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();

        handle.set_fps(500.0);
        assert_eq!(handle.fps(), 500.0);
        let _ = run_for(loop_, &mut body, &mut sink, 60).await;
        // At 5 FPS only one cycle would fit in 60ms; the raised rate
        // applies without reconstructing the loop.
        assert!(body.cycles.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn classify_once_ignores_freeze() {
        let controls = LoopControls::new(30.0);
        controls.set_frozen(true);
        let mut loop_ = InferenceLoop::new(LoopMode::Demo, controls, 60, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();
        loop_.classify_once(LoopMode::Demo, &mut body, &mut sink).await;
        assert_eq!(body.cycles.load(Ordering::SeqCst), 1);
        assert_eq!(sink.top1.len(), 1);
    }

    #[tokio::test]
    async fn classify_once_overrides_a_denied_loop() {
        let controls = LoopControls::new(30.0);
        let mut loop_ = InferenceLoop::new(LoopMode::Denied, controls, 60, 5);
        let mut body = ScriptedBody::new();
        let mut sink = RecordingSink::new();
        loop_.classify_once(LoopMode::Live, &mut body, &mut sink).await;
        assert_eq!(body.cycles.load(Ordering::SeqCst), 1);
        assert_eq!(sink.top1.len(), 1);
        // The loop itself stays denied.
        assert_eq!(loop_.mode(), LoopMode::Denied);
    }
}
