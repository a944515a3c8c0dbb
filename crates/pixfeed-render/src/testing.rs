//! WebP fixture builders.
//!
//! Still images go through the codec's lossless encoder. Animations are
//! assembled by hand: each frame is encoded as a lossless still, and its
//! `VP8L` chunk is wrapped in an `ANMF` chunk inside a `VP8X`/`ANIM`
//! container.

use image::codecs::webp::WebPEncoder;
use image::ExtendedColorType;

use pixfeed_core::{FrameBuffer, PixelFormat};

/// One frame of a fixture animation.
#[derive(Debug, Clone)]
pub struct AnimFrame {
    /// RGBA pixels of the frame rectangle.
    pub buffer: FrameBuffer,
    /// Left offset on the canvas. Must be even.
    pub x: u32,
    /// Top offset on the canvas. Must be even.
    pub y: u32,
    pub duration_ms: u32,
    /// Alpha-blend over the previous canvas (otherwise overwrite).
    pub blend: bool,
}

impl AnimFrame {
    /// A frame covering the canvas from the top-left corner.
    pub fn full(buffer: FrameBuffer, duration_ms: u32) -> Self {
        Self {
            buffer,
            x: 0,
            y: 0,
            duration_ms,
            blend: true,
        }
    }

    /// A blended sub-rectangle at (x, y).
    pub fn at(buffer: FrameBuffer, x: u32, y: u32, duration_ms: u32) -> Self {
        Self {
            buffer,
            x,
            y,
            duration_ms,
            blend: true,
        }
    }
}

/// Encode an RGBA buffer as a lossless still WebP.
pub fn still_webp(fb: &FrameBuffer) -> Vec<u8> {
    assert_eq!(fb.format, PixelFormat::Rgba8, "fixtures are RGBA");
    let mut out = Vec::new();
    WebPEncoder::new_lossless(&mut out)
        .encode(&fb.data, fb.width, fb.height, ExtendedColorType::Rgba8)
        .expect("lossless WebP encode");
    out
}

/// Assemble an animated WebP with a transparent background and infinite loop.
pub fn animated_webp(width: u32, height: u32, frames: &[AnimFrame]) -> Vec<u8> {
    let mut body = Vec::new();

    // VP8X: alpha + animation flags, canvas size minus one.
    let mut vp8x = vec![0x10 | 0x02, 0, 0, 0];
    vp8x.extend_from_slice(&u24(width - 1));
    vp8x.extend_from_slice(&u24(height - 1));
    write_chunk(&mut body, b"VP8X", &vp8x);

    // ANIM: background BGRA, loop count (0 = forever).
    write_chunk(&mut body, b"ANIM", &[0, 0, 0, 0, 0, 0]);

    for frame in frames {
        assert!(frame.x % 2 == 0 && frame.y % 2 == 0, "ANMF offsets are stored halved");
        let mut anmf = Vec::new();
        anmf.extend_from_slice(&u24(frame.x / 2));
        anmf.extend_from_slice(&u24(frame.y / 2));
        anmf.extend_from_slice(&u24(frame.buffer.width - 1));
        anmf.extend_from_slice(&u24(frame.buffer.height - 1));
        anmf.extend_from_slice(&u24(frame.duration_ms));
        // Bit 1 set means "do not blend"; bit 0 (dispose) stays clear.
        anmf.push(if frame.blend { 0 } else { 0b10 });
        anmf.extend_from_slice(&vp8l_chunk(&frame.buffer));
        write_chunk(&mut body, b"ANMF", &anmf);
    }

    let mut out = Vec::with_capacity(body.len() + 12);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend_from_slice(&body);
    out
}

/// The complete `VP8L` chunk (header and padding included) of a still encode.
fn vp8l_chunk(fb: &FrameBuffer) -> Vec<u8> {
    let still = still_webp(fb);
    let mut pos = 12;
    while pos + 8 <= still.len() {
        let fourcc = &still[pos..pos + 4];
        let size = u32::from_le_bytes([
            still[pos + 4],
            still[pos + 5],
            still[pos + 6],
            still[pos + 7],
        ]) as usize;
        let end = pos + 8 + size + (size & 1);
        if fourcc == b"VP8L" {
            return still[pos..end.min(still.len())].to_vec();
        }
        pos = end;
    }
    panic!("lossless encoder produced no VP8L chunk");
}

fn write_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

fn u24(v: u32) -> [u8; 3] {
    let b = v.to_le_bytes();
    [b[0], b[1], b[2]]
}
