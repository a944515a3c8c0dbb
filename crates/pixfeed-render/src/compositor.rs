//! Cumulative frame compositor.
//!
//! Every source frame is blended over the accumulated result of all frames
//! before it (WebP's "do not dispose" model). The accumulated canvas stays at
//! the source resolution; each snapshot is resized to the output resolution
//! and flattened to RGB.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use pixfeed_core::{FeedError, FeedResult, FrameBuffer, OutputFrame, PixelFormat, SourceFrame};

/// Accumulation canvas for one request.
pub struct Compositor {
    canvas: FrameBuffer,
    target_width: u32,
    target_height: u32,
}

impl Compositor {
    /// Create a fully transparent canvas of the source size.
    pub fn new(width: u32, height: u32, target_width: u32, target_height: u32) -> Self {
        Self {
            canvas: FrameBuffer::new(width, height, PixelFormat::Rgba8),
            target_width,
            target_height,
        }
    }

    /// The accumulated canvas so far.
    pub fn canvas(&self) -> &FrameBuffer {
        &self.canvas
    }

    /// Blend `frame` over the canvas and return the resized, opaque snapshot.
    pub fn push(&mut self, frame: &SourceFrame) -> FeedResult<OutputFrame> {
        if frame.buffer.format != PixelFormat::Rgba8 {
            return Err(FeedError::Decode(
                "source frames must be RGBA to composite".into(),
            ));
        }
        self.canvas.composite_over(&frame.buffer, 0, 0);

        let resized = resize_to_target(&self.canvas, self.target_width, self.target_height)?;
        Ok(OutputFrame {
            buffer: resized.to_rgb(),
            duration_ms: frame.duration_ms,
        })
    }
}

/// Composite a whole sequence. Output frame `i` reflects frames `0..=i`.
pub fn composite_frames(
    width: u32,
    height: u32,
    frames: &[SourceFrame],
    target_width: u32,
    target_height: u32,
) -> FeedResult<Vec<OutputFrame>> {
    let mut compositor = Compositor::new(width, height, target_width, target_height);
    frames.iter().map(|frame| compositor.push(frame)).collect()
}

/// Resize an RGBA buffer to exactly `width`x`height` with Lanczos3.
///
/// The aspect ratio is not preserved; the output always fills the target.
pub fn resize_to_target(fb: &FrameBuffer, width: u32, height: u32) -> FeedResult<FrameBuffer> {
    if fb.format != PixelFormat::Rgba8 {
        return Err(FeedError::Decode("only RGBA buffers can be resized".into()));
    }
    if fb.width == width && fb.height == height {
        return Ok(fb.clone());
    }

    let img = RgbaImage::from_raw(fb.width, fb.height, fb.data.clone())
        .ok_or_else(|| FeedError::Decode("canvas has an invalid buffer size".into()))?;
    let resized = imageops::resize(&img, width, height, FilterType::Lanczos3);

    FrameBuffer::from_raw(width, height, PixelFormat::Rgba8, resized.into_raw())
        .ok_or_else(|| FeedError::Decode("resized canvas has an invalid buffer size".into()))
}
