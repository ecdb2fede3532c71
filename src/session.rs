use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::frame::FrameBuffer;
use crate::ranking::ClassPrediction;
use crate::skeleton::Skeleton;

/// Output of one pose-estimation pass: the skeleton for the overlay
/// plus the raw feature vector the pose classifier consumes.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    pub skeleton: Skeleton,
    pub features: Vec<f32>,
}

/// One scored window from a listening audio model.
#[derive(Debug, Clone)]
pub struct AudioScores {
    /// Per-class scores, index-aligned with the model's labels.
    pub scores: Vec<f32>,
    /// Normalized waveform snapshot when requested via `ListenOptions`.
    pub waveform: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ListenOptions {
    pub overlap_factor: f32,
    pub include_waveform: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            overlap_factor: 0.5,
            include_waveform: true,
        }
    }
}

/// Session over a loaded image classifier.
#[async_trait]
pub trait ImageSession: Send {
    async fn classify(&mut self, frame: &FrameBuffer) -> Result<Vec<ClassPrediction>>;

    /// Labels reported by the model's own metadata, if it carries any.
    fn class_labels(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Session over a loaded pose model: two-stage, estimate then classify.
#[async_trait]
pub trait PoseSession: Send {
    async fn estimate(&mut self, frame: &FrameBuffer) -> Result<PoseEstimate>;

    async fn classify(&mut self, features: &[f32]) -> Result<Vec<ClassPrediction>>;

    fn class_labels(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Session over a loaded audio classifier. Scoring is push-driven: the
/// model emits `AudioScores` on its own cadence once listening starts.
#[async_trait]
pub trait AudioSession: Send {
    /// Begins scoring the microphone; scored windows arrive on the
    /// returned channel until `stop_listening` is called.
    async fn start_listening(&mut self, options: ListenOptions)
        -> Result<mpsc::Receiver<AudioScores>>;

    fn stop_listening(&mut self);

    fn class_labels(&self) -> Vec<String> {
        Vec::new()
    }
}
