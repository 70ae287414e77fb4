//! Video analysis pipeline
//!
//! extract frames -> re-encode each under the size ceiling -> detect -> normalize.
//! Frames are handled one at a time; only one frame's bytes are held in memory.

use std::path::Path;
use std::sync::Arc;

use crate::compress::{self, CompressError, CompressionPolicy};
use crate::detector::{DetectorError, PpeDetector, normalize};
use crate::frames::{self, ExtractedFrame, Ffmpeg, FrameError};
use crate::models::FrameAnalysis;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Frames(#[from] FrameError),
    #[error("frame {frame}: {source}")]
    Compress { frame: u32, source: CompressError },
    #[error("failed to read frame {frame}: {source}")]
    Read { frame: u32, source: std::io::Error },
    #[error("detection failed for every frame: {0}")]
    Detector(DetectorError),
    #[error("frame worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Pipeline {
    ffmpeg: Ffmpeg,
    policy: CompressionPolicy,
    detector: Arc<dyn PpeDetector>,
}

impl Pipeline {
    pub fn new(ffmpeg: Ffmpeg, policy: CompressionPolicy, detector: Arc<dyn PpeDetector>) -> Self {
        Self {
            ffmpeg,
            policy,
            detector,
        }
    }

    /// Analyze the video at `video_path`, using `scratch_dir` for frames.
    pub async fn run(
        &self,
        video_path: &Path,
        scratch_dir: &Path,
    ) -> Result<Vec<FrameAnalysis>, PipelineError> {
        let duration = self.ffmpeg.probe_duration(video_path).await;
        let frames_dir = scratch_dir.join("frames");
        let extracted = self.ffmpeg.extract_frames(video_path, &frames_dir).await?;
        let extracted = frames::bound_to_duration(extracted, duration);

        tracing::info!(
            frames = extracted.len(),
            duration_secs = ?duration,
            "analyzing frames"
        );

        analyze_frames(&extracted, &self.policy, self.detector.as_ref()).await
    }
}

/// Compress and detect each frame in order.
///
/// A detector failure drops that frame and processing continues. Read and
/// compression failures abort the run.
///
/// If frames were extracted but not one could be analyzed, the first detector
/// error is returned instead of an empty result. An empty `ppeData` must mean
/// "no frames", never "detector unreachable", or a total outage would read as
/// footage with nobody in it.
pub async fn analyze_frames(
    frames: &[ExtractedFrame],
    policy: &CompressionPolicy,
    detector: &dyn PpeDetector,
) -> Result<Vec<FrameAnalysis>, PipelineError> {
    let mut results = Vec::with_capacity(frames.len());
    let mut first_error: Option<DetectorError> = None;

    for frame in frames {
        let data = tokio::fs::read(&frame.path)
            .await
            .map_err(|source| PipelineError::Read {
                frame: frame.index,
                source,
            })?;

        let frame_policy = policy.clone();
        let compressed =
            tokio::task::spawn_blocking(move || compress::compress_frame(&data, &frame_policy))
                .await?
                .map_err(|source| PipelineError::Compress {
                    frame: frame.index,
                    source,
                })?;

        if compressed.passes > 1 {
            tracing::debug!(
                frame = frame.index,
                passes = compressed.passes,
                width = compressed.width,
                quality = compressed.quality,
                "frame needed extra compression passes"
            );
        }

        match detector.detect(&compressed.bytes).await {
            Ok(persons) => results.push(FrameAnalysis {
                frame: frame.index,
                timestamp_secs: frame.timestamp_secs(),
                persons: persons.iter().map(normalize).collect(),
            }),
            Err(e) => {
                tracing::warn!(frame = frame.index, error = %e, "detection failed, dropping frame");
                first_error.get_or_insert(e);
            }
        }
    }

    if results.is_empty() {
        if let Some(e) = first_error {
            return Err(PipelineError::Detector(e));
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectedBodyPart, DetectedEquipment, DetectedPerson};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Fails on the n-th call (1-based) listed in `fail_on`
    struct ScriptedDetector {
        calls: Mutex<u32>,
        fail_on: HashSet<u32>,
    }

    impl ScriptedDetector {
        fn new(fail_on: &[u32]) -> Self {
            Self {
                calls: Mutex::new(0),
                fail_on: fail_on.iter().copied().collect(),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PpeDetector for ScriptedDetector {
        async fn detect(&self, bytes: &[u8]) -> Result<Vec<DetectedPerson>, DetectorError> {
            assert!(image::load_from_memory(bytes).is_ok());
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.fail_on.contains(&call) {
                return Err(DetectorError::Api {
                    status: 500,
                    body: format!("boom {}", call),
                });
            }
            Ok(vec![DetectedPerson {
                id: Some(0),
                confidence: Some(99.0),
                body_parts: vec![DetectedBodyPart {
                    name: "HEAD".to_string(),
                    confidence: Some(95.0),
                    equipment: vec![DetectedEquipment {
                        kind: "HEAD_COVER".to_string(),
                        confidence: Some(90.0),
                        covers_body_part: Some(true),
                    }],
                }],
            }])
        }
    }

    async fn write_frames(dir: &Path, count: u32) -> Vec<ExtractedFrame> {
        let mut frames = Vec::new();
        for index in 1..=count {
            let img = ImageBuffer::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, index as u8]));
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageRgb8(img)
                .write_to(&mut buf, ImageFormat::Jpeg)
                .unwrap();
            let path = dir.join(format!("frame_{:04}.jpg", index));
            tokio::fs::write(&path, buf.into_inner()).await.unwrap();
            frames.push(ExtractedFrame { index, path });
        }
        frames
    }

    #[tokio::test]
    async fn test_all_frames_analyzed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), 3).await;
        let detector = ScriptedDetector::new(&[]);

        let results = analyze_frames(&frames, &CompressionPolicy::default(), &detector)
            .await
            .unwrap();

        let indexes: Vec<u32> = results.iter().map(|r| r.frame).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert_eq!(results[2].timestamp_secs, 2.0);
        assert!(results[0].persons[0].head_cover.detected);
    }

    #[tokio::test]
    async fn test_detector_failure_drops_only_that_frame() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), 4).await;
        let detector = ScriptedDetector::new(&[2]);

        let results = analyze_frames(&frames, &CompressionPolicy::default(), &detector)
            .await
            .unwrap();

        assert_eq!(detector.calls(), 4);
        let indexes: Vec<u32> = results.iter().map(|r| r.frame).collect();
        assert_eq!(indexes, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_all_detections_failing_reports_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), 2).await;
        let detector = ScriptedDetector::new(&[1, 2]);

        let err = analyze_frames(&frames, &CompressionPolicy::default(), &detector)
            .await
            .unwrap_err();

        match err {
            PipelineError::Detector(DetectorError::Api { body, .. }) => assert_eq!(body, "boom 1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_frame_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = write_frames(dir.path(), 1).await;
        frames.push(ExtractedFrame {
            index: 2,
            path: dir.path().join("frame_0002.jpg"),
        });
        let detector = ScriptedDetector::new(&[]);

        let err = analyze_frames(&frames, &CompressionPolicy::default(), &detector)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Read { frame: 2, .. }));
    }

    #[tokio::test]
    async fn test_no_frames_yields_empty_result() {
        let detector = ScriptedDetector::new(&[]);
        let results = analyze_frames(&[], &CompressionPolicy::default(), &detector)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(detector.calls(), 0);
    }
}
