//! # pixfeed-render
//!
//! Turns upstream WebP bytes into a sequence of opaque frames at the output
//! resolution: decode, composite each frame over everything before it, then
//! resize and drop alpha.

pub mod compositor;
pub mod decode;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compositor::{composite_frames, resize_to_target, Compositor};
pub use decode::{decode_webp, ensure_webp_support, DecodedImage};
