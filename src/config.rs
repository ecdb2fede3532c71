use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskConfig {
    pub image: ImagePanelConfig,
    pub audio: AudioPanelConfig,
    pub pose: PosePanelConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePanelConfig {
    /// Base path holding model.json + metadata.json
    pub model_base_path: String,
    /// Class set used when the model reports no labels
    pub default_labels: Vec<String>,
    /// Initial inference rate; adjustable at runtime
    pub fps: f32,
    /// Requested camera resolution width
    pub width: u32,
    /// Requested camera resolution height
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPanelConfig {
    pub model_base_path: String,
    pub default_labels: Vec<String>,
    /// Overlap between scored windows, passed to the model session
    pub overlap_factor: f32,
    /// Ask the session for waveform snapshots alongside scores
    pub include_waveform: bool,
    /// Points per oscilloscope trace in demo mode
    pub trace_points: usize,
    /// Demo-mode inference rate
    pub fps: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosePanelConfig {
    pub model_base_path: String,
    pub default_labels: Vec<String>,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Scheduler poll rate; one pass per display refresh
    pub refresh_hz: u32,
    /// Consecutive live-inference failures before the loop demotes
    /// itself to the error state
    pub max_consecutive_failures: u32,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            image: ImagePanelConfig {
                model_base_path: "models/sports".to_string(),
                default_labels: vec![
                    "soccer".to_string(),
                    "basketball".to_string(),
                    "tennis".to_string(),
                ],
                fps: 30.0,
                width: 640,
                height: 480,
            },
            audio: AudioPanelConfig {
                model_base_path: "models/oui-yes-si".to_string(),
                default_labels: vec![
                    "french (oui)".to_string(),
                    "english (yes)".to_string(),
                    "spanish (si)".to_string(),
                ],
                overlap_factor: 0.5,
                include_waveform: true,
                trace_points: 512,
                fps: 30.0,
            },
            pose: PosePanelConfig {
                model_base_path: "models/classroom_poses".to_string(),
                default_labels: vec![
                    "sitting attentive".to_string(),
                    "hand raised".to_string(),
                    "writing".to_string(),
                    "using phone".to_string(),
                    "asleep".to_string(),
                    "standing explaining".to_string(),
                ],
                fps: 15.0,
                width: 640,
                height: 480,
            },
            performance: PerformanceConfig {
                refresh_hz: 60,
                max_consecutive_failures: 5,
            },
        }
    }
}

impl KioskConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Create default config file
            let default_config = Self::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            fs::write(path, toml_content).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = KioskConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: KioskConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.image.default_labels, config.image.default_labels);
        assert_eq!(parsed.pose.default_labels.len(), 6);
        assert_eq!(parsed.performance.max_consecutive_failures, 5);
    }

    #[tokio::test]
    async fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.toml");
        let config = KioskConfig::load(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.image.fps, 30.0);
        // A second load reads the file it just wrote.
        let again = KioskConfig::load(&path).await.unwrap();
        assert_eq!(again.audio.trace_points, 512);
    }
}
