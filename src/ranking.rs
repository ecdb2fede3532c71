use std::time::Instant;

/// One class with the probability the model assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPrediction {
    pub label: String,
    pub probability: f32,
}

impl ClassPrediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Predictions sorted by probability, highest first. Ties keep the
/// original label order.
#[derive(Debug, Clone, Default)]
pub struct RankedResult {
    entries: Vec<ClassPrediction>,
}

impl RankedResult {
    pub fn top1(&self) -> Option<&ClassPrediction> {
        self.entries.first()
    }

    pub fn top_k(&self, k: usize) -> &[ClassPrediction] {
        &self.entries[..self.entries.len().min(k)]
    }

    pub fn entries(&self) -> &[ClassPrediction] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stable descending sort; model probabilities are taken as-is.
pub fn rank(mut predictions: Vec<ClassPrediction>) -> RankedResult {
    predictions.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    RankedResult {
        entries: predictions,
    }
}

/// Wall-clock stopwatch around one inference cycle. Only the most
/// recent measurement is kept.
#[derive(Debug, Default)]
pub struct LatencyMeter {
    started: Option<Instant>,
    last_ms: Option<u64>,
}

impl LatencyMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stops the running measurement and returns it in whole
    /// milliseconds, rounded to nearest.
    pub fn stop(&mut self) -> u64 {
        let elapsed = self
            .started
            .take()
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        let ms = elapsed.round() as u64;
        self.last_ms = Some(ms);
        ms
    }

    pub fn last_ms(&self) -> Option<u64> {
        self.last_ms
    }
}
