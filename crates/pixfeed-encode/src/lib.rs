//! # pixfeed-encode
//!
//! Encoding module: converts composited output frames to the bytes served to
//! the display. Animations become a looping GIF, single frames a PNG.
//! Animated output is then normalized so every GIF frame is a complete image.

pub mod gif;
pub mod magick;
pub mod normalize;
pub mod png;

use std::fmt;

pub use self::gif::GifEncoder;
pub use self::magick::ImageMagickNormalizer;
pub use self::normalize::{build_normalizer, CoalescingNormalizer, GifNormalizer, Passthrough};
pub use self::png::PngEncoder;

/// Container format of an encoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Gif,
    Png,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "image/gif",
            OutputFormat::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The final encoded image for one request.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// Number of frames the image carries.
    pub frame_count: usize,
}

impl EncodedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}
