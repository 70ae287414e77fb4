//! Frame extraction
//!
//! Samples frames from an uploaded video with ffmpeg at a fixed rate, writing
//! numbered JPEGs into the request's scratch directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::constants::FRAMES_PER_SECOND;

const FRAME_PREFIX: &str = "frame_";
const FRAME_EXTENSION: &str = "jpg";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("ffmpeg frame extraction failed: {0}")]
    Ffmpeg(String),
    #[error("no frames extracted")]
    NoFrames,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A sampled frame on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// 1-based sequence number assigned by ffmpeg
    pub index: u32,
    pub path: PathBuf,
}

impl ExtractedFrame {
    pub fn timestamp_secs(&self) -> f64 {
        f64::from(self.index.saturating_sub(1)) / f64::from(FRAMES_PER_SECOND)
    }
}

/// Handle on the ffmpeg/ffprobe binaries
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub threads: usize,
}

impl Ffmpeg {
    pub fn new(ffmpeg_path: PathBuf, ffprobe_path: PathBuf, threads: usize) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            threads,
        }
    }

    /// Video duration in seconds, if ffprobe can tell.
    pub async fn probe_duration(&self, input_path: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(input_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_duration(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "ffprobe unavailable, frame count not bounded by duration");
                None
            }
        }
    }

    /// Extract frames at `FRAMES_PER_SECOND` into `output_dir`, sorted by index.
    pub async fn extract_frames(
        &self,
        input_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<ExtractedFrame>, FrameError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let vf = format!("fps={}", FRAMES_PER_SECOND);
        let pattern = output_dir.join(format!("{}%04d.{}", FRAME_PREFIX, FRAME_EXTENSION));
        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-threads", &self.threads.to_string()])
            .arg("-i")
            .arg(input_path)
            .args(["-an", "-sn"])
            .args(["-vf", &vf])
            .args(["-q:v", "2"])
            .arg("-y")
            .arg(&pattern)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| FrameError::Spawn {
                program: self.ffmpeg_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FrameError::Ffmpeg(stderr.trim().to_string()));
        }

        let frames = collect_frames(output_dir).await?;
        if frames.is_empty() {
            return Err(FrameError::NoFrames);
        }

        tracing::debug!(count = frames.len(), dir = ?output_dir, "extracted frames");
        Ok(frames)
    }
}

/// Scan `dir` for `frame_NNNN.jpg` files and return them ordered by index.
pub async fn collect_frames(dir: &Path) -> Result<Vec<ExtractedFrame>, FrameError> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if let Some(index) = frame_index(&path) {
            frames.push(ExtractedFrame { index, path });
        }
    }
    frames.sort_by_key(|f| f.index);
    Ok(frames)
}

/// Sequence number of a `frame_NNNN.jpg` path.
fn frame_index(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some(FRAME_EXTENSION) {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(FRAME_PREFIX)?
        .parse()
        .ok()
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Most frames a video of `duration_secs` may yield.
pub fn max_frames_for(duration_secs: f64) -> usize {
    ((duration_secs * f64::from(FRAMES_PER_SECOND)).ceil() as usize).max(1)
}

/// Drop trailing frames ffmpeg emits past the end of the stream.
pub fn bound_to_duration(mut frames: Vec<ExtractedFrame>, duration_secs: Option<f64>) -> Vec<ExtractedFrame> {
    if let Some(duration) = duration_secs {
        frames.truncate(max_frames_for(duration));
    }
    frames
}
