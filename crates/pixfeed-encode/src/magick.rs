use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

use pixfeed_core::{FeedError, FeedResult, NormalizerConfig};

use crate::normalize::GifNormalizer;

/// Normalizer that shells out to ImageMagick: `<program> in.gif -coalesce out.gif`.
///
/// Both files are `NamedTempFile`s with unique names, removed when they go
/// out of scope on every return path.
pub struct ImageMagickNormalizer {
    program: String,
    temp_dir: Option<PathBuf>,
}

impl ImageMagickNormalizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            temp_dir: None,
        }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self {
            program: config.program.clone(),
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Place temporary files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Check if the configured ImageMagick binary can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn temp_gif(&self) -> FeedResult<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pixfeed-").suffix(".gif");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file)
    }
}

impl GifNormalizer for ImageMagickNormalizer {
    fn name(&self) -> &'static str {
        "imagemagick"
    }

    fn normalize(&self, gif: &[u8]) -> FeedResult<Vec<u8>> {
        let mut input = self.temp_gif()?;
        input.write_all(gif)?;
        input.flush()?;
        let output = self.temp_gif()?;

        let result = Command::new(&self.program)
            .arg(input.path())
            .arg("-coalesce")
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                FeedError::PostProcess(format!("failed to start {}: {}", self.program, e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(FeedError::PostProcess(format!(
                "{} failed with status {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        let bytes = std::fs::read(output.path())?;
        if bytes.is_empty() {
            return Err(FeedError::PostProcess(format!(
                "{} produced an empty GIF",
                self.program
            )));
        }

        tracing::debug!(
            "Coalesced GIF with {} ({} -> {} bytes)",
            self.program,
            gif.len(),
            bytes.len()
        );

        Ok(bytes)
    }
}
