//! Decoded video frames.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// One decoded RGB24 frame.
///
/// `index` is the frame's position in the container, so a frame the
/// decoder had to skip leaves a gap in the sequence.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Wrap a packed RGB24 buffer.
    pub fn from_rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> MediaResult<Self> {
        let expected = rgb_frame_len(width, height);
        if data.len() != expected {
            return Err(MediaError::frame_decode(
                index,
                format!("expected {} bytes, got {}", expected, data.len()),
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| MediaError::frame_decode(index, "buffer does not match dimensions"))?;
        Ok(Self { index, image })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Byte length of a packed RGB24 frame.
pub fn rgb_frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}
