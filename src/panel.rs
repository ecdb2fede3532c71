use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::capture::{AudioCapture, VideoCapture, VideoConstraints};
use crate::config::{AudioPanelConfig, ImagePanelConfig, PerformanceConfig, PosePanelConfig};
use crate::demo_signal::DemoSignalGenerator;
use crate::frame::FrameBuffer;
use crate::inference_loop::{
    wall_secs, CycleBody, FrameBudget, InferenceLoop, LoopControls, LoopMode, TOP_K,
};
use crate::loader::{LoadError, ModelLoader};
use crate::ranking::{rank, ClassPrediction, LatencyMeter};
use crate::render::{RenderSink, StatusBadge};
use crate::session::{AudioScores, AudioSession, ImageSession, ListenOptions, PoseSession};
use crate::skeleton;

/// Pose demo runs on a slightly faster clock than wall seconds.
const POSE_DEMO_TIME_SCALE: f64 = 10.0 / 9.0;

/// Names score positions past the end of the label set.
fn label_for(labels: &[String], index: usize) -> String {
    labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("class {}", index + 1))
}

fn effective_labels(loaded: Vec<String>, defaults: &[String]) -> Vec<String> {
    if loaded.is_empty() {
        defaults.to_vec()
    } else {
        loaded
    }
}

// ---------------------------------------------------------------------------
// Image panel
// ---------------------------------------------------------------------------

struct ImageCycle {
    camera: Box<dyn VideoCapture>,
    session: Option<Box<dyn ImageSession>>,
    labels: Vec<String>,
    demo: DemoSignalGenerator,
    current: Option<FrameBuffer>,
    /// Set while an uploaded still is pinned into the frame buffer.
    hold_frame: bool,
}

#[async_trait(?Send)]
impl CycleBody for ImageCycle {
    fn draw_preview(&mut self, sink: &mut dyn RenderSink) -> Result<()> {
        if self.hold_frame {
            if let Some(frame) = &self.current {
                sink.draw_frame(frame);
            }
            return Ok(());
        }
        if self.camera.is_active() {
            let frame = self.camera.current_frame()?;
            sink.draw_frame(&frame);
            self.current = Some(frame);
        }
        Ok(())
    }

    async fn classify_live(&mut self, _sink: &mut dyn RenderSink) -> Result<Vec<ClassPrediction>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("no live image session"))?;
        let frame = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("no frame captured yet"))?;
        session.classify(frame).await
    }

    fn classify_demo(
        &mut self,
        now_secs: f64,
        _sink: &mut dyn RenderSink,
    ) -> Result<Vec<ClassPrediction>> {
        Ok(self.demo.probabilities(&self.labels, now_secs))
    }
}

/// Webcam image classification panel: continuous camera preview plus a
/// paced classify pass, with freeze and still-upload controls.
pub struct ImagePanel<S: RenderSink> {
    controls: LoopControls,
    loop_: InferenceLoop,
    cycle: ImageCycle,
    sink: S,
}

impl<S: RenderSink> ImagePanel<S> {
    pub async fn activate(
        config: ImagePanelConfig,
        performance: PerformanceConfig,
        loader: &ModelLoader,
        mut camera: Box<dyn VideoCapture>,
        mut sink: S,
    ) -> Result<Self> {
        sink.set_status(StatusBadge::Loading);

        let (session, labels, mut mode) =
            match loader.load_image(Path::new(&config.model_base_path)).await {
                Ok(loaded) => {
                    sink.set_status(StatusBadge::Ready);
                    let labels = effective_labels(loaded.labels, &config.default_labels);
                    (Some(loaded.session), labels, LoopMode::Live)
                }
                Err(LoadError::ModelUnavailable(reason)) => {
                    warn!("Image model unavailable, demo mode for this activation: {}", reason);
                    sink.set_status(StatusBadge::Demo);
                    (None, config.default_labels.clone(), LoopMode::Demo)
                }
            };

        let constraints = VideoConstraints {
            width: config.width,
            height: config.height,
        };
        if let Err(e) = camera.acquire(&constraints) {
            warn!("Camera acquisition failed: {}", e);
            sink.set_status(StatusBadge::Denied);
            mode = LoopMode::Denied;
        }

        let controls = LoopControls::new(config.fps);
        let loop_ = InferenceLoop::new(
            mode,
            controls.clone(),
            performance.refresh_hz,
            performance.max_consecutive_failures,
        );
        info!("Image panel activated in {:?} mode", mode);

        Ok(Self {
            controls,
            loop_,
            cycle: ImageCycle {
                camera,
                session,
                labels,
                demo: DemoSignalGenerator::new(),
                current: None,
                hold_frame: false,
            },
            sink,
        })
    }

    pub fn controls(&self) -> LoopControls {
        self.controls.clone()
    }

    pub fn mode(&self) -> LoopMode {
        self.loop_.mode()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Drives the panel until its controls are cancelled.
    pub async fn run(&mut self) -> Result<()> {
        self.loop_.run(&mut self.cycle, &mut self.sink).await
    }

    /// Uploads a still: pauses the preview, pins the image into the
    /// frame buffer, runs exactly one classification cycle, and stays
    /// frozen until the user resumes.
    pub async fn classify_still(&mut self, image: &DynamicImage) {
        self.controls.set_frozen(true);
        let frame = FrameBuffer::from_image(image);
        self.sink.draw_frame(&frame);
        self.cycle.current = Some(frame);
        self.cycle.hold_frame = true;
        // Uploads classify regardless of camera state: a loaded session
        // runs live, otherwise the synthetic fallback.
        let mode = if self.cycle.session.is_some() {
            LoopMode::Live
        } else {
            LoopMode::Demo
        };
        self.loop_.classify_once(mode, &mut self.cycle, &mut self.sink).await;
    }

    pub fn resume(&mut self) {
        self.cycle.hold_frame = false;
        self.controls.set_frozen(false);
    }

    /// Stops the loop and releases the camera. Safe to call more than
    /// once, and required even after an errored cycle.
    pub fn deactivate(&mut self) {
        self.controls.cancel();
        self.cycle.camera.release();
    }
}

impl<S: RenderSink> Drop for ImagePanel<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ---------------------------------------------------------------------------
// Pose panel
// ---------------------------------------------------------------------------

struct PoseCycle {
    camera: Box<dyn VideoCapture>,
    session: Option<Box<dyn PoseSession>>,
    labels: Vec<String>,
    demo: DemoSignalGenerator,
    current: Option<FrameBuffer>,
    overlay_width: u32,
    overlay_height: u32,
}

impl PoseCycle {
    fn overlay_size(&self) -> (u32, u32) {
        match &self.current {
            Some(frame) => (frame.width, frame.height),
            None => (self.overlay_width, self.overlay_height),
        }
    }
}

#[async_trait(?Send)]
impl CycleBody for PoseCycle {
    fn draw_preview(&mut self, sink: &mut dyn RenderSink) -> Result<()> {
        if self.camera.is_active() {
            let frame = self.camera.current_frame()?;
            sink.draw_frame(&frame);
            self.current = Some(frame);
        }
        Ok(())
    }

    async fn classify_live(&mut self, sink: &mut dyn RenderSink) -> Result<Vec<ClassPrediction>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("no live pose session"))?;
        let frame = self
            .current
            .as_ref()
            .ok_or_else(|| anyhow!("no frame captured yet"))?;

        sink.clear_overlay(frame.width, frame.height);
        let estimate = session.estimate(frame).await?;
        skeleton::draw_skeleton(sink, &estimate.skeleton);
        session.classify(&estimate.features).await
    }

    fn classify_demo(
        &mut self,
        now_secs: f64,
        sink: &mut dyn RenderSink,
    ) -> Result<Vec<ClassPrediction>> {
        let (width, height) = self.overlay_size();
        sink.clear_overlay(width, height);
        self.demo.draw_figure(sink, width, height, now_secs);
        Ok(self.demo.probabilities(&self.labels, now_secs))
    }
}

/// Body-pose panel: two-stage live path (estimate skeleton, then
/// classify its features) with a skeleton overlay per cycle.
pub struct PosePanel<S: RenderSink> {
    controls: LoopControls,
    loop_: InferenceLoop,
    cycle: PoseCycle,
    sink: S,
}

impl<S: RenderSink> PosePanel<S> {
    pub async fn activate(
        config: PosePanelConfig,
        performance: PerformanceConfig,
        loader: &ModelLoader,
        mut camera: Box<dyn VideoCapture>,
        mut sink: S,
    ) -> Result<Self> {
        sink.set_status(StatusBadge::Loading);

        let (session, labels, mut mode) =
            match loader.load_pose(Path::new(&config.model_base_path)).await {
                Ok(loaded) => {
                    sink.set_status(StatusBadge::Ready);
                    let labels = effective_labels(loaded.labels, &config.default_labels);
                    (Some(loaded.session), labels, LoopMode::Live)
                }
                Err(LoadError::ModelUnavailable(reason)) => {
                    warn!("Pose model unavailable, demo mode for this activation: {}", reason);
                    sink.set_status(StatusBadge::Demo);
                    (None, config.default_labels.clone(), LoopMode::Demo)
                }
            };

        let constraints = VideoConstraints {
            width: config.width,
            height: config.height,
        };
        if let Err(e) = camera.acquire(&constraints) {
            warn!("Camera acquisition failed: {}", e);
            sink.set_status(StatusBadge::Denied);
            mode = LoopMode::Denied;
        }

        let controls = LoopControls::new(config.fps);
        let loop_ = InferenceLoop::new(
            mode,
            controls.clone(),
            performance.refresh_hz,
            performance.max_consecutive_failures,
        );
        info!("Pose panel activated in {:?} mode", mode);

        Ok(Self {
            controls,
            loop_,
            cycle: PoseCycle {
                camera,
                session,
                labels,
                demo: DemoSignalGenerator::high_contrast().with_time_scale(POSE_DEMO_TIME_SCALE),
                current: None,
                overlay_width: config.width,
                overlay_height: config.height,
            },
            sink,
        })
    }

    pub fn controls(&self) -> LoopControls {
        self.controls.clone()
    }

    pub fn mode(&self) -> LoopMode {
        self.loop_.mode()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn run(&mut self) -> Result<()> {
        self.loop_.run(&mut self.cycle, &mut self.sink).await
    }

    pub fn deactivate(&mut self) {
        self.controls.cancel();
        self.cycle.camera.release();
    }
}

impl<S: RenderSink> Drop for PosePanel<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ---------------------------------------------------------------------------
// Audio panel
// ---------------------------------------------------------------------------

/// Spoken-word panel. The live path is push-driven by the model's own
/// scoring cadence; the demo path pairs synthetic probabilities with an
/// oscilloscope drawn from real microphone samples.
pub struct AudioPanel<S: RenderSink> {
    config: AudioPanelConfig,
    performance: PerformanceConfig,
    controls: LoopControls,
    mode: LoopMode,
    session: Option<Box<dyn AudioSession>>,
    labels: Vec<String>,
    microphone: Box<dyn AudioCapture>,
    demo: DemoSignalGenerator,
    sink: S,
}

impl<S: RenderSink> AudioPanel<S> {
    pub async fn activate(
        config: AudioPanelConfig,
        performance: PerformanceConfig,
        loader: &ModelLoader,
        microphone: Box<dyn AudioCapture>,
        mut sink: S,
    ) -> Result<Self> {
        sink.set_status(StatusBadge::Loading);

        let (session, labels, mode) =
            match loader.load_audio(Path::new(&config.model_base_path)).await {
                Ok(loaded) => {
                    sink.set_status(StatusBadge::Ready);
                    let labels = effective_labels(loaded.labels, &config.default_labels);
                    (Some(loaded.session), labels, LoopMode::Live)
                }
                Err(LoadError::ModelUnavailable(reason)) => {
                    warn!("Audio model unavailable, demo mode for this activation: {}", reason);
                    sink.set_status(StatusBadge::Demo);
                    (None, config.default_labels.clone(), LoopMode::Demo)
                }
            };

        let controls = LoopControls::new(config.fps);
        info!("Audio panel activated in {:?} mode", mode);

        Ok(Self {
            config,
            performance,
            controls,
            mode,
            session,
            labels,
            microphone,
            demo: DemoSignalGenerator::high_contrast(),
            sink,
        })
    }

    pub fn controls(&self) -> LoopControls {
        self.controls.clone()
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.performance.refresh_hz.max(1) as f64)
    }

    fn render_scores(
        sink: &mut S,
        labels: &[String],
        scores: &AudioScores,
        meter: &mut LatencyMeter,
    ) {
        let predictions: Vec<ClassPrediction> = scores
            .scores
            .iter()
            .enumerate()
            .map(|(i, &p)| ClassPrediction::new(label_for(labels, i), p))
            .collect();
        let ranked = rank(predictions);
        if let Some(top) = ranked.top1() {
            sink.show_top1(&top.label, top.probability);
        }
        sink.show_top_k(ranked.top_k(TOP_K));
        if let Some(waveform) = &scores.waveform {
            sink.draw_trace(waveform);
        }
        sink.show_latency(meter.stop());
    }

    /// Starts listening and drives the panel until the controls are
    /// cancelled. Microphone and session are released on every exit
    /// path.
    pub async fn run(&mut self) -> Result<()> {
        match self.mode {
            LoopMode::Live => self.run_live().await,
            LoopMode::Demo => self.run_demo().await,
            LoopMode::Denied | LoopMode::Error => Ok(()),
        }
    }

    async fn run_live(&mut self) -> Result<()> {
        let options = ListenOptions {
            overlap_factor: self.config.overlap_factor,
            include_waveform: self.config.include_waveform,
        };
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| anyhow!("no live audio session"))?;

        let mut rx = match session.start_listening(options).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Audio session failed to start listening: {}", e);
                if self.mode.can_transition(LoopMode::Error) {
                    self.mode = LoopMode::Error;
                }
                self.sink.set_status(StatusBadge::Error);
                return Ok(());
            }
        };
        self.sink.set_status(StatusBadge::Ready);

        let refresh = self.refresh_interval();
        let mut meter = LatencyMeter::new();
        loop {
            if self.controls.cancelled() {
                break;
            }
            match tokio::time::timeout(refresh, rx.recv()).await {
                Ok(Some(scores)) => {
                    // Freeze drops incoming windows; the last render
                    // stays up until the mic is switched back on.
                    if self.controls.frozen() {
                        continue;
                    }
                    meter.start();
                    Self::render_scores(&mut self.sink, &self.labels, &scores, &mut meter);
                }
                Ok(None) => {
                    debug!("Audio session closed its score channel");
                    break;
                }
                Err(_) => {} // no window this pass
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.stop_listening();
        }
        Ok(())
    }

    async fn run_demo(&mut self) -> Result<()> {
        let mut rx = match self.microphone.acquire() {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Microphone acquisition failed: {}", e);
                if self.mode.can_transition(LoopMode::Denied) {
                    self.mode = LoopMode::Denied;
                }
                self.sink.set_status(StatusBadge::Denied);
                return Ok(());
            }
        };
        self.sink.set_status(StatusBadge::Ready);

        let refresh = self.refresh_interval();
        let mut meter = LatencyMeter::new();
        let mut last_tick: Option<std::time::Instant> = None;
        loop {
            if self.controls.cancelled() {
                break;
            }

            // Oscilloscope follows the raw microphone, unthrottled.
            match tokio::time::timeout(refresh, rx.recv()).await {
                Ok(Some(chunk)) => {
                    let take = chunk.samples.len().min(self.config.trace_points);
                    self.sink.draw_trace(&chunk.samples[chunk.samples.len() - take..]);
                }
                Ok(None) => break,
                Err(_) => {
                    // No mic samples this pass; a synthetic trace keeps
                    // the oscilloscope moving.
                    let trace = self.demo.waveform(wall_secs(), self.config.trace_points);
                    self.sink.draw_trace(&trace);
                }
            }

            let budget = FrameBudget::from_fps(self.controls.fps());
            let now = std::time::Instant::now();
            let due = last_tick.map_or(true, |t| now.duration_since(t) >= budget.interval());
            if due && !self.controls.frozen() {
                last_tick = Some(now);
                meter.start();
                let predictions = self.demo.probabilities(&self.labels, wall_secs());
                let ranked = rank(predictions);
                if let Some(top) = ranked.top1() {
                    self.sink.show_top1(&top.label, top.probability);
                }
                self.sink.show_top_k(ranked.top_k(TOP_K));
                self.sink.show_latency(meter.stop());
            }
        }

        self.microphone.release();
        Ok(())
    }

    /// Plays a short sample clip through the default output device.
    /// Failures are logged and swallowed; clips are a convenience.
    pub fn play_clip(&self, path: &Path) {
        match Self::try_play_clip(path) {
            Ok(()) => debug!("Played clip {}", path.display()),
            Err(e) => debug!("Clip playback failed for {}: {}", path.display(), e),
        }
    }

    fn try_play_clip(path: &Path) -> Result<()> {
        let (_stream, handle) = rodio::OutputStream::try_default()?;
        let sink = rodio::Sink::try_new(&handle)?;
        let file = std::fs::File::open(path)?;
        let source = rodio::Decoder::new(std::io::BufReader::new(file))?;
        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }

    /// Stops listening and releases the microphone. Idempotent.
    pub fn deactivate(&mut self) {
        self.controls.cancel();
        if let Some(session) = self.session.as_mut() {
            session.stop_listening();
        }
        self.microphone.release();
    }
}

impl<S: RenderSink> Drop for AudioPanel<S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
