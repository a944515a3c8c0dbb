//! GIF frame normalization.
//!
//! Some consumers of the feed can only draw self-contained GIF frames, so
//! every animation goes through a normalizer that rewrites each frame as a
//! complete full-screen image. The default implementation does this
//! in-process; [`ImageMagickNormalizer`](crate::ImageMagickNormalizer) shells
//! out to `convert -coalesce` instead.

use ::gif::{ColorOutput, DecodeOptions, DisposalMethod};

use pixfeed_core::{FeedError, FeedResult, NormalizerConfig, NormalizerKind};

use crate::gif::GifEncoder;
use crate::magick::ImageMagickNormalizer;

/// Raw GIF bytes in, GIF with only full frames out.
pub trait GifNormalizer: Send + Sync {
    /// Name used in logs and health output.
    fn name(&self) -> &'static str;

    fn normalize(&self, gif: &[u8]) -> FeedResult<Vec<u8>>;
}

/// Build the normalizer selected by configuration.
pub fn build_normalizer(config: &NormalizerConfig, gif_speed: i32) -> Box<dyn GifNormalizer> {
    match config.kind {
        NormalizerKind::Coalesce => Box::new(CoalescingNormalizer::new(gif_speed)),
        NormalizerKind::ImageMagick => Box::new(ImageMagickNormalizer::from_config(config)),
        NormalizerKind::None => Box::new(Passthrough),
    }
}

/// Leaves the GIF untouched.
pub struct Passthrough;

impl GifNormalizer for Passthrough {
    fn name(&self) -> &'static str {
        "none"
    }

    fn normalize(&self, gif: &[u8]) -> FeedResult<Vec<u8>> {
        Ok(gif.to_vec())
    }
}

/// In-process equivalent of ImageMagick's `-coalesce`.
///
/// Plays the animation onto a logical screen (frame offsets, transparency and
/// disposal honored) and writes out the screen after every frame.
pub struct CoalescingNormalizer {
    speed: i32,
}

impl CoalescingNormalizer {
    pub fn new(speed: i32) -> Self {
        Self {
            speed: speed.clamp(1, 30),
        }
    }
}

impl GifNormalizer for CoalescingNormalizer {
    fn name(&self) -> &'static str {
        "coalesce"
    }

    fn normalize(&self, gif: &[u8]) -> FeedResult<Vec<u8>> {
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        let mut decoder = options
            .read_info(gif)
            .map_err(|e| FeedError::PostProcess(format!("failed to read GIF: {}", e)))?;

        let screen_w = decoder.width();
        let screen_h = decoder.height();
        let stride = screen_w as usize * 4;
        let mut screen = vec![0u8; stride * screen_h as usize];
        let mut screens = Vec::new();

        while let Some(frame) = decoder
            .read_next_frame()
            .map_err(|e| FeedError::PostProcess(format!("failed to read GIF frame: {}", e)))?
        {
            let saved = (frame.dispose == DisposalMethod::Previous).then(|| screen.clone());

            // Visible part of the frame rectangle; empty when it lies off-screen.
            let left = (frame.left as usize).min(screen_w as usize);
            let top = (frame.top as usize).min(screen_h as usize);
            let right = (frame.left as usize + frame.width as usize).min(screen_w as usize);
            let bottom = (frame.top as usize + frame.height as usize).min(screen_h as usize);
            let frame_stride = frame.width as usize * 4;

            for y in top..bottom {
                for x in left..right {
                    let src = (y - frame.top as usize) * frame_stride
                        + (x - frame.left as usize) * 4;
                    let px = &frame.buffer[src..src + 4];
                    if px[3] == 0 {
                        continue;
                    }
                    let dst = y * stride + x * 4;
                    screen[dst..dst + 4].copy_from_slice(px);
                }
            }

            screens.push((screen.clone(), frame.delay));

            match frame.dispose {
                DisposalMethod::Background => {
                    for y in top..bottom {
                        screen[y * stride + left * 4..y * stride + right * 4].fill(0);
                    }
                }
                DisposalMethod::Previous => {
                    if let Some(saved) = saved {
                        screen = saved;
                    }
                }
                _ => {}
            }
        }

        if screens.is_empty() {
            return Err(FeedError::PostProcess("GIF contains no frames".into()));
        }

        let frame_count = screens.len();
        let repeat = decoder.repeat();
        let out = GifEncoder::encode_rgba_screens(screens, screen_w, screen_h, repeat, self.speed)?;

        tracing::debug!(
            "Coalesced {} GIF frames ({}x{}, {} -> {} bytes)",
            frame_count,
            screen_w,
            screen_h,
            gif.len(),
            out.len()
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::gif::{Encoder, Frame, Repeat};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn solid(width: u16, height: u16, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect()
    }

    /// Full red 4x4 first frame, then a 2x2 blue patch at (2, 2).
    fn partial_gif(first_dispose: DisposalMethod) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = Encoder::new(&mut out, 4, 4, &[]).unwrap();
            encoder.set_repeat(Repeat::Infinite).unwrap();

            let mut full = solid(4, 4, RED);
            let mut first = Frame::from_rgba(4, 4, &mut full);
            first.delay = 10;
            first.dispose = first_dispose;
            encoder.write_frame(&first).unwrap();

            let mut patch = solid(2, 2, BLUE);
            let mut second = Frame::from_rgba(2, 2, &mut patch);
            second.left = 2;
            second.top = 2;
            second.delay = 20;
            encoder.write_frame(&second).unwrap();
        }
        out
    }

    fn decode_frames(bytes: &[u8]) -> (Vec<(u16, u16, u16, u16, u16, Vec<u8>)>, Repeat) {
        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::RGBA);
        let mut decoder = options.read_info(bytes).unwrap();
        let mut frames = Vec::new();
        while let Some(f) = decoder.read_next_frame().unwrap() {
            frames.push((f.left, f.top, f.width, f.height, f.delay, f.buffer.to_vec()));
        }
        (frames, decoder.repeat())
    }

    fn pixel(buf: &[u8], width: usize, x: usize, y: usize) -> [u8; 4] {
        let i = (y * width + x) * 4;
        [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
    }

    #[test]
    fn test_coalesce_expands_partial_frames() {
        let input = partial_gif(DisposalMethod::Keep);
        let (before, _) = decode_frames(&input);
        assert_eq!((before[1].2, before[1].3), (2, 2));

        let output = CoalescingNormalizer::new(10).normalize(&input).unwrap();
        let (frames, repeat) = decode_frames(&output);

        assert_eq!(repeat, Repeat::Infinite);
        assert_eq!(frames.len(), 2);
        for (left, top, width, height, _, _) in &frames {
            assert_eq!((*left, *top, *width, *height), (0, 0, 4, 4));
        }
        assert_eq!(frames[0].4, 10);
        assert_eq!(frames[1].4, 20);

        let second = &frames[1].5;
        assert_eq!(pixel(second, 4, 0, 0), RED);
        assert_eq!(pixel(second, 4, 3, 3), BLUE);
    }

    #[test]
    fn test_coalesce_honors_background_disposal() {
        let input = partial_gif(DisposalMethod::Background);
        let output = CoalescingNormalizer::new(10).normalize(&input).unwrap();
        let (frames, _) = decode_frames(&output);

        let second = &frames[1].5;
        assert_eq!(pixel(second, 4, 0, 0)[3], 0, "first frame was disposed");
        assert_eq!(pixel(second, 4, 2, 2), BLUE);
    }

    #[test]
    fn test_coalesce_rejects_garbage() {
        let err = CoalescingNormalizer::new(10).normalize(b"GIF-ish").unwrap_err();
        assert!(matches!(err, FeedError::PostProcess(_)));
    }

    #[test]
    fn test_coalesce_clips_offscreen_frames() {
        let mut input = Vec::new();
        {
            let mut encoder = Encoder::new(&mut input, 4, 4, &[]).unwrap();
            let mut full = solid(4, 4, RED);
            let mut first = Frame::from_rgba(4, 4, &mut full);
            first.delay = 10;
            encoder.write_frame(&first).unwrap();

            let mut patch = solid(2, 2, BLUE);
            let mut outside = Frame::from_rgba(2, 2, &mut patch);
            outside.left = 10;
            outside.top = 1;
            outside.delay = 10;
            outside.dispose = DisposalMethod::Background;
            encoder.write_frame(&outside).unwrap();
        }

        match CoalescingNormalizer::new(10).normalize(&input) {
            Ok(output) => {
                let (frames, _) = decode_frames(&output);
                assert_eq!(frames.len(), 2);
                assert_eq!(pixel(&frames[1].5, 4, 3, 3), RED);
            }
            Err(err) => assert!(matches!(err, FeedError::PostProcess(_)), "{err}"),
        }
    }

    #[test]
    fn test_passthrough_is_identity() {
        let input = partial_gif(DisposalMethod::Keep);
        assert_eq!(Passthrough.normalize(&input).unwrap(), input);
    }

    #[test]
    fn test_build_normalizer_by_kind() {
        let mut config = NormalizerConfig::default();
        assert_eq!(build_normalizer(&config, 10).name(), "coalesce");
        config.kind = NormalizerKind::ImageMagick;
        assert_eq!(build_normalizer(&config, 10).name(), "imagemagick");
        config.kind = NormalizerKind::None;
        assert_eq!(build_normalizer(&config, 10).name(), "none");
    }
}
