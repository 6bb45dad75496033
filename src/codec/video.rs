use std::ffi::OsStr;
use std::path::Path;

use super::{run_tool, CodecError};

/// Grabs one frame `seek_secs` into the stream and cover-crops it to `size`².
pub async fn extract_frame(ffmpeg: &str, source: &Path, dest: &Path, size: u32, seek_secs: u32) -> Result<(), CodecError> {
    let seek = format!("{}", seek_secs);
    let filter = format!("scale={s}:{s}:force_original_aspect_ratio=increase,crop={s}:{s}", s = size);
    let args: [&OsStr; 13] = [
        OsStr::new("-y"),
        OsStr::new("-v"),
        OsStr::new("error"),
        OsStr::new("-ss"),
        OsStr::new(&seek),
        OsStr::new("-i"),
        source.as_os_str(),
        OsStr::new("-frames:v"),
        OsStr::new("1"),
        OsStr::new("-vf"),
        OsStr::new(&filter),
        OsStr::new("-q:v"),
        OsStr::new("3"),
    ];
    run_tool(ffmpeg, args.into_iter().chain(std::iter::once(dest.as_os_str()))).await?;
    if !dest.is_file() {
        // ffmpeg exits 0 without output when the stream is shorter than the seek offset
        return Err(CodecError::ToolFailed {
            tool: ffmpeg.to_string(),
            status: "exit status: 0".into(),
            stderr: "no frame written".into(),
        });
    }
    Ok(())
}

/// Probes the container duration; any failure yields `None`.
pub async fn probe_duration(ffprobe: &str, source: &Path) -> Option<String> {
    let args = [
        OsStr::new("-v"),
        OsStr::new("error"),
        OsStr::new("-show_entries"),
        OsStr::new("format=duration"),
        OsStr::new("-of"),
        OsStr::new("default=noprint_wrappers=1:nokey=1"),
        source.as_os_str(),
    ];
    match run_tool(ffprobe, args).await {
        Ok(out) => parse_duration(&String::from_utf8_lossy(&out.stdout)),
        Err(e) => {
            tracing::debug!(path = %source.display(), error = %e, "duration probe failed");
            None
        }
    }
}

/// Parses ffprobe's seconds output into `"M:SS"`.
pub fn parse_duration(stdout: &str) -> Option<String> {
    let secs: f64 = stdout.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(format_duration(secs))
}

pub fn format_duration(secs: f64) -> String {
    let total = secs.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
