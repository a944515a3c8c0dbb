use ::gif::{DisposalMethod, Encoder, Frame, Repeat};

use pixfeed_core::{FeedError, FeedResult, OutputFrame, PixelFormat};

/// Native GIF encoder built on the `gif` crate.
///
/// Every frame is written as a full-canvas image with its own palette and no
/// transparent index, so no frame depends on the one before it.
pub struct GifEncoder;

impl GifEncoder {
    /// Encode a sequence of RGB output frames to a looping GIF.
    ///
    /// # Arguments
    /// * `frames` - Ordered output frames, all `width`x`height` RGB
    /// * `width` - Canvas width in pixels
    /// * `height` - Canvas height in pixels
    /// * `speed` - NeuQuant sampling speed, 1 (best) to 30 (fastest)
    pub fn encode(
        frames: &[OutputFrame],
        width: u32,
        height: u32,
        speed: i32,
    ) -> FeedResult<Vec<u8>> {
        if frames.is_empty() {
            return Err(FeedError::Encode("no frames to encode for GIF".into()));
        }
        if !(1..=30).contains(&speed) {
            return Err(FeedError::Encode(format!(
                "GIF quantizer speed {} out of range 1..=30",
                speed
            )));
        }
        let (w, h) = gif_dimensions(width, height)?;

        let mut out = Vec::new();
        {
            let mut encoder = Encoder::new(&mut out, w, h, &[])
                .map_err(|e| FeedError::Encode(format!("failed to start GIF: {}", e)))?;
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| FeedError::Encode(format!("failed to set GIF repeat: {}", e)))?;

            for (i, frame) in frames.iter().enumerate() {
                let fb = &frame.buffer;
                if fb.width != width || fb.height != height {
                    return Err(FeedError::Encode(format!(
                        "frame {} has dimensions {}x{}, expected {}x{}",
                        i, fb.width, fb.height, width, height
                    )));
                }
                if fb.format != PixelFormat::Rgb8 || fb.byte_size() != fb.pixel_count() * 3 {
                    return Err(FeedError::Encode(format!("frame {} is not packed RGB", i)));
                }

                let mut gif_frame = Frame::from_rgb_speed(w, h, &fb.data, speed);
                gif_frame.delay = delay_centis(frame.duration_ms);
                gif_frame.dispose = DisposalMethod::Background;

                encoder.write_frame(&gif_frame).map_err(|e| {
                    FeedError::Encode(format!("failed to encode GIF frame {}: {}", i, e))
                })?;
            }
        }

        tracing::debug!(
            "Encoded {} frames to GIF ({}x{}, {} bytes)",
            frames.len(),
            width,
            height,
            out.len()
        );

        Ok(out)
    }

    /// Write already-rendered RGBA screens as full frames, keeping each
    /// frame's delay. Used by the in-process coalescer.
    pub(crate) fn encode_rgba_screens(
        screens: Vec<(Vec<u8>, u16)>,
        width: u16,
        height: u16,
        repeat: Repeat,
        speed: i32,
    ) -> FeedResult<Vec<u8>> {
        let mut out = Vec::new();
        {
            let mut encoder = Encoder::new(&mut out, width, height, &[])
                .map_err(|e| FeedError::PostProcess(format!("failed to start GIF: {}", e)))?;
            encoder
                .set_repeat(repeat)
                .map_err(|e| FeedError::PostProcess(format!("failed to set GIF repeat: {}", e)))?;

            for (i, (mut rgba, delay)) in screens.into_iter().enumerate() {
                let mut frame = Frame::from_rgba_speed(width, height, &mut rgba, speed);
                frame.delay = delay;
                frame.dispose = DisposalMethod::Background;
                encoder.write_frame(&frame).map_err(|e| {
                    FeedError::PostProcess(format!("failed to write coalesced frame {}: {}", i, e))
                })?;
            }
        }
        Ok(out)
    }
}

/// GIF delays are centiseconds; round to nearest and saturate.
pub fn delay_centis(duration_ms: u32) -> u16 {
    let cs = (duration_ms as u64 + 5) / 10;
    cs.min(u16::MAX as u64) as u16
}

fn gif_dimensions(width: u32, height: u32) -> FeedResult<(u16, u16)> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(FeedError::Encode(format!(
            "GIF cannot hold a {}x{} canvas",
            width, height
        ))),
    }
}
