use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

/// Duration given to frames that declare none, in milliseconds.
pub const DEFAULT_FRAME_MS: u32 = 350;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://10.50.15.20:8000/66b20de2/next".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub default_frame_ms: u32,
    /// NeuQuant sampling speed for GIF palettes, 1 (best) to 30 (fastest).
    pub gif_speed: i32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            default_frame_ms: DEFAULT_FRAME_MS,
            gif_speed: 10,
        }
    }
}

/// Which GIF normalizer runs after encoding an animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizerKind {
    /// Re-render every frame in-process.
    #[default]
    Coalesce,
    /// Shell out to ImageMagick's `-coalesce`.
    ImageMagick,
    /// Pass the encoder output through untouched.
    None,
}

impl NormalizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizerKind::Coalesce => "coalesce",
            NormalizerKind::ImageMagick => "imagemagick",
            NormalizerKind::None => "none",
        }
    }
}

impl fmt::Display for NormalizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NormalizerKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coalesce" => Ok(NormalizerKind::Coalesce),
            "imagemagick" | "magick" => Ok(NormalizerKind::ImageMagick),
            "none" | "off" => Ok(NormalizerKind::None),
            other => Err(FeedError::Config(format!(
                "unknown normalizer '{}' (expected coalesce, imagemagick or none)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub kind: NormalizerKind,
    /// ImageMagick binary, `convert` for IM6 or `magick` for IM7.
    pub program: String,
    /// Directory for the ImageMagick temp files; the system temp dir if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            kind: NormalizerKind::default(),
            program: "convert".to_string(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub output: OutputConfig,
    pub normalizer: NormalizerConfig,
}

impl FeedConfig {
    pub fn load_from_file(path: &Path) -> FeedResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FeedConfig = toml::from_str(&contents)
            .map_err(|e| FeedError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> FeedResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| FeedError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Target output size as (width, height).
    pub fn target_size(&self) -> (u32, u32) {
        (self.output.width, self.output.height)
    }

    /// Reject values the encoders cannot honor.
    pub fn validate(&self) -> FeedResult<()> {
        let url = self.upstream.url.trim();
        if url.is_empty() {
            return Err(FeedError::Config("upstream.url is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FeedError::Config(format!(
                "upstream.url must be an http(s) URL, got '{}'",
                url
            )));
        }

        // GIF stores dimensions as u16.
        let max = u16::MAX as u32;
        let (w, h) = self.target_size();
        if w == 0 || h == 0 || w > max || h > max {
            return Err(FeedError::Config(format!(
                "output size {}x{} out of range (1..={} per side)",
                w, h, max
            )));
        }
        if self.output.default_frame_ms == 0 {
            return Err(FeedError::Config(
                "output.default_frame_ms must be positive".into(),
            ));
        }
        if !(1..=30).contains(&self.output.gif_speed) {
            return Err(FeedError::Config(format!(
                "output.gif_speed must be within 1..=30, got {}",
                self.output.gif_speed
            )));
        }
        if self.normalizer.kind == NormalizerKind::ImageMagick
            && self.normalizer.program.trim().is_empty()
        {
            return Err(FeedError::Config("normalizer.program is empty".into()));
        }
        Ok(())
    }
}
