use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageBuffer, Rgb};

/// Raw RGB frame as delivered by a capture device or a still upload.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        let size = (width * height * channels) as usize;
        Self {
            data: vec![0u8; size],
            width,
            height,
            channels,
        }
    }

    pub fn from_image(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());
        Self {
            data: rgb.into_raw(),
            width,
            height,
            channels: 3,
        }
    }

    pub fn to_image(&self) -> Result<DynamicImage> {
        if self.channels == 3 {
            let buffer = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(
                self.width,
                self.height,
                self.data.clone(),
            )
            .ok_or_else(|| anyhow!("Failed to create image buffer"))?;
            Ok(DynamicImage::ImageRgb8(buffer))
        } else {
            Err(anyhow!("Unsupported channel count: {}", self.channels))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Block of microphone samples, mono f32 in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_image() {
        let mut frame = FrameBuffer::new(4, 2, 3);
        frame.data[0] = 255;
        frame.data[4] = 17;
        let image = frame.to_image().unwrap();
        let back = FrameBuffer::from_image(&image);
        assert_eq!(back.width, 4);
        assert_eq!(back.height, 2);
        assert_eq!(back.data, frame.data);
    }

    #[test]
    fn rejects_unknown_channel_count() {
        let frame = FrameBuffer::new(2, 2, 4);
        assert!(frame.to_image().is_err());
    }
}
