//! Media decoder contract.
//!
//! The decoder is an external collaborator; the pipeline only depends
//! on this trait. The bundled implementation shells out to ffmpeg and
//! ffprobe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use vagent_models::{FrameSamplingMode, QualityBucket, VideoMetadata};

use crate::error::{WorkerError, WorkerResult};

/// A frame extracted by the decoder, before analysis.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    /// Monotonic frame number
    pub frame_number: u64,
    /// Presentation timestamp in seconds
    pub timestamp_sec: f64,
    /// Encoded image bytes (JPEG)
    pub data: Vec<u8>,
}

/// External media decoder contract.
#[async_trait]
pub trait MediaDecoder: Send + Sync {
    /// Verify the file is a decodable video.
    async fn validate(&self, path: &Path) -> WorkerResult<()>;

    /// Extract container metadata.
    async fn extract_metadata(&self, path: &Path) -> WorkerResult<VideoMetadata>;

    /// Extract frames per the sampling mode, capped by `max_frames`
    /// (0 = unbounded).
    async fn extract_frames(
        &self,
        path: &Path,
        mode: FrameSamplingMode,
        sample_rate: f64,
        max_frames: u32,
    ) -> WorkerResult<Vec<ExtractedFrame>>;

    /// Extract the audio track; returns the path of the audio file.
    async fn extract_audio(&self, path: &Path) -> WorkerResult<PathBuf>;
}

/// ffmpeg/ffprobe-backed decoder.
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
    work_dir: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            work_dir: work_dir.into(),
        }
    }

    async fn probe(&self, path: &Path) -> WorkerResult<serde_json::Value> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WorkerError::decoder(format!("failed to spawn ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::decoder(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| WorkerError::decoder(format!("ffprobe output unparsable: {}", e)))
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn validate(&self, path: &Path) -> WorkerResult<()> {
        let probe = self.probe(path).await?;
        let has_video = probe["streams"]
            .as_array()
            .map(|streams| {
                streams
                    .iter()
                    .any(|s| s["codec_type"].as_str() == Some("video"))
            })
            .unwrap_or(false);

        if !has_video {
            return Err(WorkerError::validation("file has no decodable video stream"));
        }
        Ok(())
    }

    async fn extract_metadata(&self, path: &Path) -> WorkerResult<VideoMetadata> {
        let probe = self.probe(path).await?;

        let streams = probe["streams"].as_array().cloned().unwrap_or_default();
        let video = streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"))
            .ok_or_else(|| WorkerError::validation("file has no video stream"))?;
        let audio = streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("audio"));

        let duration_sec = probe["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);
        let width = video["width"].as_u64().unwrap_or(0) as u32;
        let height = video["height"].as_u64().unwrap_or(0) as u32;

        // "30000/1001" style rational
        let fps = video["r_frame_rate"]
            .as_str()
            .and_then(|s| {
                let (num, den) = s.split_once('/')?;
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                if den > 0.0 {
                    Some(num / den)
                } else {
                    None
                }
            })
            .unwrap_or(0.0);

        Ok(VideoMetadata {
            duration_sec,
            width,
            height,
            fps,
            codec: video["codec_name"].as_str().unwrap_or("unknown").to_string(),
            bitrate_kbps: probe["format"]["bit_rate"]
                .as_str()
                .and_then(|s| s.parse::<u64>().ok())
                .map(|b| b / 1000)
                .unwrap_or(0),
            audio_codec: audio.and_then(|a| a["codec_name"].as_str().map(str::to_string)),
            audio_channels: audio.and_then(|a| a["channels"].as_u64()).map(|c| c as u32),
            audio_sample_rate: audio
                .and_then(|a| a["sample_rate"].as_str())
                .and_then(|s| s.parse().ok()),
            quality: QualityBucket::from_height(height),
        })
    }

    async fn extract_frames(
        &self,
        path: &Path,
        mode: FrameSamplingMode,
        sample_rate: f64,
        max_frames: u32,
    ) -> WorkerResult<Vec<ExtractedFrame>> {
        let out_dir = self.work_dir.join(format!("frames-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&out_dir).await?;
        let pattern = out_dir.join("frame-%06d.jpg");

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-i"]).arg(path);

        let rate = if sample_rate > 0.0 { sample_rate } else { 1.0 };
        match mode {
            // Scene-based sampling materialises at keyframes; the
            // orchestrator trims after scene detection.
            FrameSamplingMode::Keyframes | FrameSamplingMode::SceneBased => {
                cmd.args(["-vf", "select='eq(pict_type,I)'", "-vsync", "vfr"]);
            }
            FrameSamplingMode::Uniform => {
                cmd.arg("-vf").arg(format!("fps={}", rate));
            }
        }
        if max_frames > 0 {
            cmd.arg("-frames:v").arg(max_frames.to_string());
        }
        cmd.args(["-q:v", "2"]).arg(&pattern);

        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WorkerError::decoder(format!("failed to spawn ffmpeg: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::decoder(format!(
                "frame extraction failed: {}",
                stderr.trim()
            )));
        }

        let mut names: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(&out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.path());
        }
        names.sort();

        let mut frames = Vec::with_capacity(names.len());
        for (i, file) in names.iter().enumerate() {
            let data = tokio::fs::read(file).await?;
            frames.push(ExtractedFrame {
                frame_number: i as u64,
                timestamp_sec: match mode {
                    FrameSamplingMode::Uniform => i as f64 / rate,
                    _ => i as f64,
                },
                data,
            });
        }

        tokio::fs::remove_dir_all(&out_dir).await.ok();
        debug!(count = frames.len(), mode = %mode, "Extracted frames");
        Ok(frames)
    }

    async fn extract_audio(&self, path: &Path) -> WorkerResult<PathBuf> {
        let out = self.work_dir.join(format!("audio-{}.wav", uuid::Uuid::new_v4()));

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
            .arg(&out)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WorkerError::decoder(format!("failed to spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::decoder(format!(
                "audio extraction failed: {}",
                stderr.trim()
            )));
        }

        Ok(out)
    }
}

/// Deterministic in-memory decoder for tests.
pub struct FakeDecoder {
    /// Frames returned by `extract_frames`
    pub frames: Vec<ExtractedFrame>,
    /// Metadata returned by `extract_metadata`
    pub metadata: VideoMetadata,
    /// Paths considered valid
    pub valid_paths: HashMap<PathBuf, bool>,
}

impl FakeDecoder {
    pub fn with_frames(count: u64) -> Self {
        Self {
            frames: (0..count)
                .map(|n| ExtractedFrame {
                    frame_number: n,
                    timestamp_sec: n as f64,
                    data: vec![0u8; 16],
                })
                .collect(),
            metadata: VideoMetadata {
                duration_sec: count as f64,
                width: 1280,
                height: 720,
                fps: 30.0,
                codec: "h264".to_string(),
                bitrate_kbps: 2500,
                audio_codec: Some("aac".to_string()),
                audio_channels: Some(2),
                audio_sample_rate: Some(44_100),
                quality: QualityBucket::Hd,
            },
            valid_paths: HashMap::new(),
        }
    }
}

#[async_trait]
impl MediaDecoder for FakeDecoder {
    async fn validate(&self, path: &Path) -> WorkerResult<()> {
        match self.valid_paths.get(path) {
            Some(false) => Err(WorkerError::validation("not a video")),
            _ => Ok(()),
        }
    }

    async fn extract_metadata(&self, _path: &Path) -> WorkerResult<VideoMetadata> {
        Ok(self.metadata.clone())
    }

    async fn extract_frames(
        &self,
        _path: &Path,
        _mode: FrameSamplingMode,
        _sample_rate: f64,
        max_frames: u32,
    ) -> WorkerResult<Vec<ExtractedFrame>> {
        let mut frames = self.frames.clone();
        if max_frames > 0 {
            frames.truncate(max_frames as usize);
        }
        Ok(frames)
    }

    async fn extract_audio(&self, _path: &Path) -> WorkerResult<PathBuf> {
        Ok(PathBuf::from("/tmp/fake-audio.wav"))
    }
}
