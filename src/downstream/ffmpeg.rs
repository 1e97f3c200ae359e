//! MJPEG AVI to H.264 MP4 conversion via an external FFmpeg

use super::{CompletedSegment, SegmentSink};
use crate::config::ConversionSettings;
use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub struct FfmpegConverter {
    ffmpeg: PathBuf,
    delete_source: bool,
}

impl FfmpegConverter {
    pub fn new(settings: &ConversionSettings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg_path.clone(),
            delete_source: settings.delete_source,
        }
    }

    /// The MP4 written next to `input`.
    pub fn output_path(input: &Path) -> PathBuf {
        input.with_extension("mp4")
    }

    pub fn build_args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-crf".to_string(),
            "23".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl SegmentSink for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn on_segment_ready(&self, segment: CompletedSegment) -> anyhow::Result<()> {
        let output = Self::output_path(&segment.path);
        let args = Self::build_args(&segment.path, &output);
        tracing::info!(segment = segment.number, "Converting {:?} -> {:?}", segment.path, output);

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to start {:?}", self.ffmpeg))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("FFmpeg exited with {}: {}", result.status, stderr.trim());
        }

        if self.delete_source {
            tokio::fs::remove_file(&segment.path)
                .await
                .with_context(|| format!("Converted, but could not remove {:?}", segment.path))?;
        }

        tracing::info!(segment = segment.number, "Converted to {:?}", output);
        Ok(())
    }
}
