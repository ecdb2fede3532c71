use crate::ranking::ClassPrediction;
use crate::render::RenderSink;
use crate::skeleton;

/// Phase offset between neighboring class waves, in radians.
const PHASE_STEP: f64 = 2.0;

/// Deterministic synthetic signal used whenever no real model is
/// available. The output only exists to keep the ranking and render
/// path alive; it approximates nothing.
#[derive(Debug, Clone)]
pub struct DemoSignalGenerator {
    time_scale: f64,
    gain: f64,
    floor: f64,
}

impl DemoSignalGenerator {
    /// Softened profile used by the image panel: every class keeps a
    /// visible share of the distribution at its trough.
    pub fn new() -> Self {
        Self {
            time_scale: 1.0,
            gain: 0.25,
            floor: 0.25,
        }
    }

    /// Higher-contrast profile used by the audio and pose demos: a
    /// class bottoms out near zero at its trough.
    pub fn high_contrast() -> Self {
        Self {
            time_scale: 1.0,
            gain: 1.0 / 3.0,
            floor: 0.0,
        }
    }

    /// Pose demo runs on a slightly faster clock than the other panels.
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// One smoothly-varying probability per label, normalized to sum
    /// to 1. Phase-shifted sinusoids keep the ranking order churning.
    pub fn probabilities(&self, labels: &[String], now_secs: f64) -> Vec<ClassPrediction> {
        let t = now_secs * self.time_scale;
        let raw: Vec<f64> = (0..labels.len())
            .map(|i| ((t + PHASE_STEP * i as f64).sin() + 1.0) * self.gain + self.floor)
            .collect();
        let sum: f64 = raw.iter().sum();
        labels
            .iter()
            .zip(raw)
            .map(|(label, value)| ClassPrediction::new(label.clone(), (value / sum) as f32))
            .collect()
    }

    /// Synthetic oscilloscope trace: a slow-breathing sine, one sample
    /// per requested point, in [-1, 1].
    pub fn waveform(&self, now_secs: f64, points: usize) -> Vec<f32> {
        let t = now_secs * self.time_scale;
        let envelope = 0.6 + 0.4 * t.sin();
        (0..points)
            .map(|i| ((t * 3.0 + i as f64 * 0.08).sin() * envelope) as f32)
            .collect()
    }

    /// Animated stick figure standing in for pose estimation output.
    pub fn draw_figure(&self, sink: &mut dyn RenderSink, width: u32, height: u32, now_secs: f64) {
        skeleton::draw_demo_figure(sink, width, height, now_secs);
    }
}

impl Default for DemoSignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}
