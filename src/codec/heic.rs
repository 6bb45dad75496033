//! Ordered HEIC → JPEG fallback chain.
//!
//! No single tool decodes HEIC color and orientation reliably everywhere, so
//! converters are tried in configured order and the first success wins.

use std::path::Path;

use async_trait::async_trait;

use super::{run_tool, CodecError};
use crate::config::AppConfig;

#[async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// True when the output pixels are already rotated upright, so any
    /// orientation tag left in the output must be ignored.
    fn orientation_baked(&self) -> bool;

    async fn try_convert(&self, source: &Path, dest: &Path) -> Result<(), CodecError>;
}

/// `heif-convert` from libheif: preserves the color profile, applies orientation.
pub struct HeifConvert {
    pub bin: String,
}

#[async_trait]
impl Converter for HeifConvert {
    fn name(&self) -> &str {
        "heif-convert"
    }

    fn orientation_baked(&self) -> bool {
        true
    }

    async fn try_convert(&self, source: &Path, dest: &Path) -> Result<(), CodecError> {
        run_tool(&self.bin, [os("-q"), os("90"), source.as_os_str(), dest.as_os_str()]).await?;
        Ok(())
    }
}

/// ffmpeg selecting the primary video stream. Orientation is not carried over,
/// the output is treated as upright.
pub struct FfmpegConvert {
    pub bin: String,
}

#[async_trait]
impl Converter for FfmpegConvert {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn orientation_baked(&self) -> bool {
        true
    }

    async fn try_convert(&self, source: &Path, dest: &Path) -> Result<(), CodecError> {
        run_tool(
            &self.bin,
            [
                os("-y"),
                os("-v"),
                os("error"),
                os("-i"),
                source.as_os_str(),
                os("-map"),
                os("0:v:0"),
                os("-frames:v"),
                os("1"),
                os("-pix_fmt"),
                os("yuvj420p"),
                os("-q:v"),
                os("2"),
                dest.as_os_str(),
            ],
        )
        .await?;
        Ok(())
    }
}

/// macOS `sips`. Keeps the source EXIF block, so the orientation tag of the
/// output still has to be applied.
pub struct SipsConvert {
    pub bin: String,
}

#[async_trait]
impl Converter for SipsConvert {
    fn name(&self) -> &str {
        "sips"
    }

    fn orientation_baked(&self) -> bool {
        false
    }

    async fn try_convert(&self, source: &Path, dest: &Path) -> Result<(), CodecError> {
        if !cfg!(target_os = "macos") {
            return Err(CodecError::Unavailable {
                tool: self.bin.clone(),
                reason: "only available on macOS".into(),
            });
        }
        run_tool(
            &self.bin,
            [os("-s"), os("format"), os("jpeg"), source.as_os_str(), os("--out"), dest.as_os_str()],
        )
        .await?;
        Ok(())
    }
}

pub struct ConverterChain {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterChain {
    pub fn new(converters: Vec<Box<dyn Converter>>) -> Self {
        Self { converters }
    }

    /// Builds the chain in the order of `thumbnails.heic_converters`.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let converters = cfg
            .thumbnails
            .heic_converters
            .iter()
            .filter_map(|name| -> Option<Box<dyn Converter>> {
                match name.as_str() {
                    "heif-convert" => Some(Box::new(HeifConvert { bin: cfg.tools.heif_convert.clone() })),
                    "ffmpeg" => Some(Box::new(FfmpegConvert { bin: cfg.tools.ffmpeg.clone() })),
                    "sips" => Some(Box::new(SipsConvert { bin: cfg.tools.sips.clone() })),
                    other => {
                        tracing::warn!("unknown heic converter {:?} ignored", other);
                        None
                    }
                }
            })
            .collect();
        Self { converters }
    }

    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    /// Tries each converter in order and returns the one that succeeded.
    pub async fn convert(&self, source: &Path, dest: &Path) -> Result<&dyn Converter, CodecError> {
        let mut attempts = Vec::with_capacity(self.converters.len());
        for converter in &self.converters {
            match converter.try_convert(source, dest).await {
                Ok(()) => {
                    tracing::debug!(converter = converter.name(), path = %source.display(), "heic converted");
                    return Ok(converter.as_ref());
                }
                Err(e) => {
                    tracing::warn!(
                        converter = converter.name(),
                        path = %source.display(),
                        error = %e,
                        "heic converter failed, trying next"
                    );
                    // A failed stage may leave a truncated output behind
                    let _ = tokio::fs::remove_file(dest).await;
                    attempts.push(format!("{}: {}", converter.name(), e));
                }
            }
        }
        Err(CodecError::ConvertersExhausted { path: source.to_path_buf(), attempts })
    }
}

fn os(s: &str) -> &std::ffi::OsStr {
    std::ffi::OsStr::new(s)
}
