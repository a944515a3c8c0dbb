//! The per-request feed pipeline.
//!
//! FETCHING -> DECODING -> COMPOSITING -> ENCODING -> (GIF_POSTPROCESS) ->
//! RESPONDING, run once and synchronously. Any stage can fail; the failure
//! carries the stage it happened in so the handler can log it.

use std::fmt;

use pixfeed_core::{ContentHash, FeedConfig, FeedError, OutputFrame};
use pixfeed_encode::{
    build_normalizer, EncodedImage, GifEncoder, GifNormalizer, OutputFormat, PngEncoder,
};
use pixfeed_render::{composite_frames, decode_webp, ensure_webp_support};

use crate::upstream::Upstream;

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Decoding,
    Compositing,
    Encoding,
    GifPostprocess,
    Responding,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Decoding => "decoding",
            Stage::Compositing => "compositing",
            Stage::Encoding => "encoding",
            Stage::GifPostprocess => "gif_postprocess",
            Stage::Responding => "responding",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline error together with the stage that raised it.
///
/// Displays as the bare error so the response body stays the error text.
#[derive(Debug)]
pub struct FeedFailure {
    pub stage: Stage,
    pub error: FeedError,
}

impl FeedFailure {
    fn at(stage: Stage) -> impl FnOnce(FeedError) -> FeedFailure {
        move |error| FeedFailure { stage, error }
    }
}

impl fmt::Display for FeedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for FeedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Immutable per-process service: configuration plus the chosen normalizer.
/// Every request allocates its own buffers.
pub struct FeedService {
    config: FeedConfig,
    upstream: Upstream,
    normalizer: Box<dyn GifNormalizer>,
}

impl FeedService {
    pub fn new(config: FeedConfig) -> Self {
        let normalizer = build_normalizer(&config.normalizer, config.output.gif_speed);
        Self::with_normalizer(config, normalizer)
    }

    pub fn with_normalizer(config: FeedConfig, normalizer: Box<dyn GifNormalizer>) -> Self {
        let upstream = Upstream::new(config.upstream.url.clone());
        Self {
            config,
            upstream,
            normalizer,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn normalizer_name(&self) -> &'static str {
        self.normalizer.name()
    }

    /// Fetch the upstream image and run the whole pipeline.
    pub fn render(&self) -> Result<EncodedImage, FeedFailure> {
        tracing::debug!(stage = %Stage::Fetching, url = self.upstream.url());
        let bytes = self.upstream.fetch().map_err(FeedFailure::at(Stage::Fetching))?;
        self.render_bytes(&bytes)
    }

    /// Run the pipeline from DECODING on already fetched bytes.
    pub fn render_bytes(&self, bytes: &[u8]) -> Result<EncodedImage, FeedFailure> {
        let output = &self.config.output;
        let (target_w, target_h) = self.config.target_size();

        tracing::debug!(stage = %Stage::Decoding, bytes = bytes.len());
        let decoded =
            decode_webp(bytes, output.default_frame_ms).map_err(FeedFailure::at(Stage::Decoding))?;

        tracing::debug!(stage = %Stage::Compositing, frames = decoded.frames.len());
        let frames = composite_frames(
            decoded.width,
            decoded.height,
            &decoded.frames,
            target_w,
            target_h,
        )
        .map_err(FeedFailure::at(Stage::Compositing))?;

        tracing::debug!(stage = %Stage::Encoding, animated = decoded.is_animated());
        let image = if frames.len() > 1 {
            self.encode_animation(&frames, target_w, target_h)?
        } else {
            encode_still(&frames)?
        };

        tracing::debug!(stage = %Stage::Responding, bytes = image.bytes.len());
        Ok(image)
    }

    fn encode_animation(
        &self,
        frames: &[OutputFrame],
        width: u32,
        height: u32,
    ) -> Result<EncodedImage, FeedFailure> {
        let gif = GifEncoder::encode(frames, width, height, self.config.output.gif_speed)
            .map_err(FeedFailure::at(Stage::Encoding))?;

        tracing::debug!(stage = %Stage::GifPostprocess, normalizer = self.normalizer.name());
        let bytes = self
            .normalizer
            .normalize(&gif)
            .map_err(FeedFailure::at(Stage::GifPostprocess))?;

        Ok(EncodedImage {
            bytes,
            format: OutputFormat::Gif,
            frame_count: frames.len(),
        })
    }
}

fn encode_still(frames: &[OutputFrame]) -> Result<EncodedImage, FeedFailure> {
    let frame = frames.first().ok_or_else(|| FeedFailure {
        stage: Stage::Encoding,
        error: FeedError::Encode("no frames to encode".into()),
    })?;
    ensure_webp_support().map_err(FeedFailure::at(Stage::Encoding))?;
    let bytes = PngEncoder::encode(frame).map_err(FeedFailure::at(Stage::Encoding))?;
    Ok(EncodedImage {
        bytes,
        format: OutputFormat::Png,
        frame_count: 1,
    })
}

/// Digest of an encoded image, used as its ETag.
pub fn digest(image: &EncodedImage) -> ContentHash {
    ContentHash::of(&image.bytes)
}
