use image::codecs::png::PngEncoder as ImagePngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use pixfeed_core::{FeedError, FeedResult, OutputFrame, PixelFormat};

/// Single-frame PNG encoder using the `image` crate.
pub struct PngEncoder;

impl PngEncoder {
    /// Fail unless the image codec was built with PNG encoding.
    pub fn ensure_available() -> FeedResult<()> {
        if ImageFormat::Png.writing_enabled() {
            Ok(())
        } else {
            Err(FeedError::Capability(
                "PNG encoding is not available in the image codec".into(),
            ))
        }
    }

    /// Encode one RGB output frame as an 8-bit RGB PNG.
    pub fn encode(frame: &OutputFrame) -> FeedResult<Vec<u8>> {
        Self::ensure_available()?;

        let fb = &frame.buffer;
        if fb.format != PixelFormat::Rgb8 {
            return Err(FeedError::Encode("PNG output frame is not RGB".into()));
        }

        let mut out = Vec::new();
        ImagePngEncoder::new(&mut out)
            .write_image(&fb.data, fb.width, fb.height, ExtendedColorType::Rgb8)
            .map_err(|e| FeedError::Encode(format!("failed to encode PNG: {}", e)))?;

        tracing::debug!(
            "Encoded PNG ({}x{}, {} bytes)",
            fb.width,
            fb.height,
            out.len()
        );

        Ok(out)
    }
}
