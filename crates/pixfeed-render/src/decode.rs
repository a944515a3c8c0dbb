//! WebP decoding.
//! Produces the source frame sequence, still or animated, with per-frame
//! durations.

use std::io::Cursor;

use image::codecs::webp::WebPDecoder;
use image::{DynamicImage, ImageDecoder, ImageFormat};

use pixfeed_core::{FeedError, FeedResult, FrameBuffer, PixelFormat, SourceFrame};

/// The decoded upstream image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Frames in display order, each at the canvas size. Never empty.
    pub frames: Vec<SourceFrame>,
}

impl DecodedImage {
    /// More than one frame.
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }
}

/// Fail unless the image codec was built with WebP decoding.
pub fn ensure_webp_support() -> FeedResult<()> {
    if ImageFormat::WebP.reading_enabled() {
        Ok(())
    } else {
        Err(FeedError::Capability(
            "WebP decoding is not available in the image codec".into(),
        ))
    }
}

/// Decode WebP bytes into source frames.
///
/// Animated images yield one canvas-sized RGBA layer per `ANMF` frame: the
/// frame's own pixels at its offset, transparent everywhere else, not yet
/// blended with earlier frames. A zero duration is treated as undeclared and
/// replaced with `default_frame_ms`; still images always get
/// `default_frame_ms`.
pub fn decode_webp(bytes: &[u8], default_frame_ms: u32) -> FeedResult<DecodedImage> {
    if bytes.is_empty() {
        return Err(FeedError::Decode("upstream returned an empty body".into()));
    }

    let decoder = WebPDecoder::new(Cursor::new(bytes))
        .map_err(|e| FeedError::Decode(format!("failed to read WebP header: {}", e)))?;
    let (width, height) = decoder.dimensions();

    let frames = if decoder.has_animation() {
        decode_animation(bytes, width, height, default_frame_ms)?
    } else {
        let img = DynamicImage::from_decoder(decoder)
            .map_err(|e| FeedError::Decode(format!("failed to decode WebP image: {}", e)))?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let buffer = FrameBuffer::from_raw(w, h, PixelFormat::Rgba8, rgba.into_raw())
            .ok_or_else(|| FeedError::Decode("decoded image has an invalid buffer size".into()))?;
        vec![SourceFrame {
            buffer,
            duration_ms: default_frame_ms,
        }]
    };

    if frames.is_empty() {
        return Err(FeedError::Decode("WebP image contains no frames".into()));
    }

    tracing::debug!(
        "Decoded WebP {}x{} with {} frame(s)",
        width,
        height,
        frames.len()
    );

    Ok(DecodedImage {
        width,
        height,
        frames,
    })
}

/// Decode every `ANMF` frame as an independent still and lay it out on a
/// transparent canvas-sized layer at its offset. Blend and dispose flags are
/// not read; the compositor blends every layer over the canvas.
fn decode_animation(
    bytes: &[u8],
    width: u32,
    height: u32,
    default_frame_ms: u32,
) -> FeedResult<Vec<SourceFrame>> {
    riff_chunks(bytes)?
        .into_iter()
        .filter(|(fourcc, _)| fourcc == b"ANMF")
        .enumerate()
        .map(|(i, (_, payload))| {
            let anmf = AnimFrameHeader::parse(payload)
                .ok_or_else(|| FeedError::Decode(format!("frame {} has a truncated header", i)))?;
            let raw = decode_frame_bitstream(&anmf, &payload[ANMF_HEADER_LEN..])
                .map_err(|e| match e {
                    FeedError::Decode(msg) => FeedError::Decode(format!("frame {}: {}", i, msg)),
                    other => other,
                })?;

            let mut layer = FrameBuffer::new(width, height, PixelFormat::Rgba8);
            layer.composite_over(&raw, anmf.x as i32, anmf.y as i32);

            Ok(SourceFrame {
                buffer: layer,
                duration_ms: frame_duration(anmf.duration_ms, default_frame_ms),
            })
        })
        .collect()
}

/// Bytes before the frame bitstream inside an `ANMF` payload.
const ANMF_HEADER_LEN: usize = 16;

/// Placement and timing of one animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AnimFrameHeader {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    duration_ms: u32,
}

impl AnimFrameHeader {
    fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < ANMF_HEADER_LEN {
            return None;
        }
        Some(Self {
            x: read_u24(&payload[0..3]) * 2,
            y: read_u24(&payload[3..6]) * 2,
            width: read_u24(&payload[6..9]) + 1,
            height: read_u24(&payload[9..12]) + 1,
            duration_ms: read_u24(&payload[12..15]),
        })
    }
}

/// Rewrap a frame's `ALPH`/`VP8`/`VP8L` chunks as a standalone extended
/// WebP and decode it to RGBA.
fn decode_frame_bitstream(header: &AnimFrameHeader, chunks: &[u8]) -> FeedResult<FrameBuffer> {
    let has_alpha = chunk_list(chunks)?
        .iter()
        .any(|(fourcc, _)| fourcc == b"ALPH" || fourcc == b"VP8L");

    let mut vp8x = vec![if has_alpha { 0x10 } else { 0 }, 0, 0, 0];
    vp8x.extend_from_slice(&write_u24(header.width - 1));
    vp8x.extend_from_slice(&write_u24(header.height - 1));

    let mut body = Vec::with_capacity(chunks.len() + 22);
    body.extend_from_slice(b"WEBP");
    body.extend_from_slice(b"VP8X");
    body.extend_from_slice(&(vp8x.len() as u32).to_le_bytes());
    body.extend_from_slice(&vp8x);
    body.extend_from_slice(chunks);

    let mut still = Vec::with_capacity(body.len() + 8);
    still.extend_from_slice(b"RIFF");
    still.extend_from_slice(&(body.len() as u32).to_le_bytes());
    still.extend_from_slice(&body);

    let decoder = WebPDecoder::new(Cursor::new(still.as_slice()))
        .map_err(|e| FeedError::Decode(format!("failed to read frame bitstream: {}", e)))?;
    let rgba = DynamicImage::from_decoder(decoder)
        .map_err(|e| FeedError::Decode(format!("failed to decode frame bitstream: {}", e)))?
        .to_rgba8();

    let (w, h) = rgba.dimensions();
    if (w, h) != (header.width, header.height) {
        return Err(FeedError::Decode(format!(
            "frame bitstream is {}x{} but its header says {}x{}",
            w, h, header.width, header.height
        )));
    }
    FrameBuffer::from_raw(w, h, PixelFormat::Rgba8, rgba.into_raw())
        .ok_or_else(|| FeedError::Decode("frame has an invalid buffer size".into()))
}

/// Top-level chunks of a `RIFF`/`WEBP` file.
fn riff_chunks(bytes: &[u8]) -> FeedResult<Vec<([u8; 4], &[u8])>> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
        return Err(FeedError::Decode("missing RIFF/WEBP header".into()));
    }
    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let end = declared.saturating_add(8).min(bytes.len());
    chunk_list(&bytes[12..end])
}

/// Consecutive `fourcc | size | payload | pad` chunks.
fn chunk_list(mut bytes: &[u8]) -> FeedResult<Vec<([u8; 4], &[u8])>> {
    let mut chunks = Vec::new();
    while bytes.len() >= 8 {
        let fourcc = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let rest = &bytes[8..];
        if size > rest.len() {
            return Err(FeedError::Decode(format!(
                "truncated {} chunk",
                String::from_utf8_lossy(&fourcc)
            )));
        }
        chunks.push((fourcc, &rest[..size]));
        let padded = (size + (size & 1)).min(rest.len());
        bytes = &rest[padded..];
    }
    Ok(chunks)
}

fn read_u24(b: &[u8]) -> u32 {
    u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16
}

fn write_u24(v: u32) -> [u8; 3] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}

/// A zero duration counts as undeclared.
fn frame_duration(declared_ms: u32, default_frame_ms: u32) -> u32 {
    if declared_ms == 0 {
        default_frame_ms
    } else {
        declared_ms
    }
}
