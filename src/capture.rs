use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::frame::{AudioChunk, FrameBuffer};

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("device access denied")]
    DeviceDenied,
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

#[derive(Debug, Clone, Copy)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

/// Live video device. `release` must stop all underlying hardware
/// tracks and must be safe to call more than once.
pub trait VideoCapture {
    fn acquire(&mut self, constraints: &VideoConstraints) -> Result<(), CaptureError>;

    /// Most recent frame from the device. Only valid while acquired.
    fn current_frame(&mut self) -> Result<FrameBuffer>;

    fn release(&mut self);

    fn is_active(&self) -> bool;
}

/// Live audio device feeding sample chunks over a channel. `release`
/// closes the underlying stream and its processing context.
pub trait AudioCapture {
    fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, CaptureError>;

    fn release(&mut self);

    fn is_active(&self) -> bool;
}

fn classify_device_error(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("denied") || lower.contains("permission") {
        CaptureError::DeviceDenied
    } else {
        CaptureError::DeviceUnavailable(message)
    }
}

/// Camera adapter over nokhwa. Probes the requested index first, then
/// any other detected camera.
pub struct CameraCapture {
    camera_id: u32,
    camera: Option<Camera>,
}

impl CameraCapture {
    pub fn new(camera_id: u32) -> Self {
        Self {
            camera_id,
            camera: None,
        }
    }

    pub fn detect_cameras() -> Vec<u32> {
        let mut cameras = Vec::new();
        for cam_id in 0..10 {
            let camera_index = CameraIndex::Index(cam_id);
            let requested =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            if Camera::new(camera_index, requested).is_ok() {
                cameras.push(cam_id);
            }
        }
        cameras
    }

    fn try_open(&mut self, camera_id: u32) -> Result<(), CaptureError> {
        let camera_index = CameraIndex::Index(camera_id);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = Camera::new(camera_index, requested)
            .map_err(|e| classify_device_error(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| classify_device_error(e.to_string()))?;
        // Capture once to prove the stream is usable.
        camera
            .frame()
            .map_err(|e| classify_device_error(e.to_string()))?;

        self.camera = Some(camera);
        self.camera_id = camera_id;
        Ok(())
    }
}

impl VideoCapture for CameraCapture {
    fn acquire(&mut self, _constraints: &VideoConstraints) -> Result<(), CaptureError> {
        if self.camera.is_some() {
            return Ok(());
        }

        let available = Self::detect_cameras();
        if available.is_empty() {
            return Err(CaptureError::DeviceUnavailable(
                "no cameras detected on this system".to_string(),
            ));
        }
        info!("Found {} camera(s): {:?}", available.len(), available);

        let candidates = if available.contains(&self.camera_id) {
            vec![self.camera_id]
        } else {
            available
        };

        let mut last_err = CaptureError::DeviceUnavailable("no candidate cameras".to_string());
        for cam_id in candidates {
            match self.try_open(cam_id) {
                Ok(()) => {
                    info!("Camera {} acquired", cam_id);
                    return Ok(());
                }
                Err(CaptureError::DeviceDenied) => return Err(CaptureError::DeviceDenied),
                Err(e) => {
                    warn!("Failed to open camera {}: {}", cam_id, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    fn current_frame(&mut self) -> Result<FrameBuffer> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| anyhow!("camera not acquired"))?;
        let frame = camera.frame()?;
        let decoded = frame.decode_image::<RgbFormat>()?;
        let width = decoded.width();
        let height = decoded.height();
        debug!("Captured camera frame: {}x{}", width, height);

        let mut buffer = FrameBuffer::new(width, height, 3);
        buffer.data = decoded.into_raw();
        Ok(buffer)
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            match camera.stop_stream() {
                Ok(_) => info!("Camera {} stream stopped", self.camera_id),
                Err(e) => warn!("Error stopping camera stream: {}", e),
            }
        }
    }

    fn is_active(&self) -> bool {
        self.camera.is_some()
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Microphone adapter over cpal. Sample chunks arrive on a bounded
/// channel; overflow drops the newest chunk rather than blocking the
/// audio callback.
pub struct MicrophoneCapture {
    stream: Option<cpal::Stream>,
}

impl MicrophoneCapture {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn find_input_device(host: &cpal::Host) -> Option<cpal::Device> {
        if let Some(device) = host.default_input_device() {
            info!(
                "Found default input device: {}",
                device.name().unwrap_or_else(|_| "Unknown".to_string())
            );
            return Some(device);
        }
        warn!("No default input device, scanning for alternatives");
        host.input_devices().ok()?.next()
    }

    fn build_stream(
        device: &cpal::Device,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Result<cpal::Stream, CaptureError> {
        let supported = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let stream_config = supported.config();
        let err_fn = |err| error!("Audio input stream error: {}", err);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let _ = tx.try_send(AudioChunk {
                            samples: data.to_vec(),
                            sample_rate,
                        });
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| classify_device_error(e.to_string()))?,
            cpal::SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let samples = data
                            .iter()
                            .map(|&s| s as f32 / i16::MAX as f32)
                            .collect();
                        let _ = tx.try_send(AudioChunk {
                            samples,
                            sample_rate,
                        });
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| classify_device_error(e.to_string()))?,
            cpal::SampleFormat::U16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        let samples = data
                            .iter()
                            .map(|&s| (s as f32 - 32768.0) / 32768.0)
                            .collect();
                        let _ = tx.try_send(AudioChunk {
                            samples,
                            sample_rate,
                        });
                    },
                    err_fn,
                    None,
                )
                .map_err(|e| classify_device_error(e.to_string()))?,
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };

        Ok(stream)
    }
}

impl Default for MicrophoneCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCapture for MicrophoneCapture {
    fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, CaptureError> {
        self.release();

        let host = cpal::default_host();
        let device = Self::find_input_device(&host).ok_or_else(|| {
            CaptureError::DeviceUnavailable("no input device available".to_string())
        })?;

        let (tx, rx) = mpsc::channel(8);
        let stream = Self::build_stream(&device, tx)?;
        stream
            .play()
            .map_err(|e| classify_device_error(e.to_string()))?;

        self.stream = Some(stream);
        info!("Microphone stream started");
        Ok(rx)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("Microphone stream stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.release();
    }
}
