//! The per-job pipeline orchestrator.
//!
//! Stages run strictly in order: prepare -> validate -> metadata -> frames
//! -> audio -> scenes -> classify -> summarize -> persist. A stage whose
//! option is disabled is a no-op but still publishes its progress
//! anchor. Audio failures are non-fatal; classify/summarize failures
//! yield empty artifacts; every other stage failure is terminal.
//! Cancellation is consulted between stages and at each frame and
//! scene step.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use vagent_bus::{frames_topic, progress_topic, scenes_topic, EventBus};
use vagent_index::SimilarityIndex;
use vagent_model_client::{
    ClassificationRequest, EmbeddingKind, ModelClient, SynthesisKind, TranscriptionOptions,
};
use vagent_models::{
    parse_vision_response, BusMessage, Frame, Job, ModelUsage, PipelineStage, ProcessingResult,
    Scene, SceneDescriptors, SceneEmbedding, ScenePayload, VideoEmbedding, VideoPayload,
};
use vagent_queue::{Cacher, JobQueue};

use crate::aggregate::{aggregate_embeddings, content_hash};
use crate::config::WorkerConfig;
use crate::decoder::MediaDecoder;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::prepare;
use crate::scenes::{cosine_similarity, detect_scenes, SceneConfig, SceneRange};
use crate::store::JobStore;

/// Shared collaborators threaded through every stage.
pub struct PipelineContext {
    pub config: WorkerConfig,
    pub queue: JobQueue,
    pub bus: EventBus,
    pub index: SimilarityIndex,
    pub model: ModelClient,
    pub decoder: Arc<dyn MediaDecoder>,
    pub store: Arc<dyn JobStore>,
    pub cacher: Cacher,
    pub http: reqwest::Client,
}

/// Cache key for a source's transcript, stable across retries of the
/// same reference.
fn transcript_cache_key(reference: &str) -> String {
    use sha2::{Digest, Sha256};
    format!("transcript:{:x}", Sha256::digest(reference.trim().as_bytes()))
}

/// Cooperative cancellation flag, set by the executor's watcher task.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Executes the stage graph for claimed jobs.
pub struct PipelineOrchestrator {
    ctx: Arc<PipelineContext>,
}

impl PipelineOrchestrator {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Run the full pipeline for one job.
    pub async fn process(&self, job: &Job, cancel: &CancelToken) -> WorkerResult<ProcessingResult> {
        let ctx = &self.ctx;
        let log = JobLogger::new(&job.id);
        let started = Instant::now();
        let mut result = ProcessingResult::new(job.id.clone());

        self.publish_started(job).await;

        // 1. Prepare
        self.check_cancel(cancel)?;
        let source = prepare::resolve_source(&ctx.config, &ctx.http, job).await?;
        log.stage("prepare", "source resolved");
        self.publish_stage(job, PipelineStage::Prepare, "source resolved").await;

        // 2. Validate
        self.check_cancel(cancel)?;
        ctx.decoder.validate(&source.path).await?;
        self.publish_stage(job, PipelineStage::Validate, "video validated").await;

        // 3. Metadata
        self.check_cancel(cancel)?;
        let metadata = ctx.decoder.extract_metadata(&source.path).await?;
        ctx.store.save_metadata(&job.id, &metadata).await?;
        result.metadata = metadata;
        self.publish_stage(job, PipelineStage::Metadata, "metadata extracted").await;

        // 4. Frames
        self.check_cancel(cancel)?;
        if job.options.extract_frames {
            let frames = self.run_frames_stage(job, cancel, &source.path, &mut result).await?;
            ctx.store.save_frames(&job.id, &frames).await?;
            result.frames = frames;
        }
        self.publish_stage(job, PipelineStage::Frames, "frames analyzed").await;

        // 5. Audio (failures are non-fatal)
        self.check_cancel(cancel)?;
        if job.options.extract_audio {
            match self.run_audio_stage(job, &source.path, &mut result).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    log.warn("audio", &format!("continuing without audio: {}", e));
                }
            }
        }
        self.publish_stage(job, PipelineStage::Audio, "audio processed").await;

        // 6. Scenes
        self.check_cancel(cancel)?;
        if job.options.detect_scenes && !result.frames.is_empty() {
            let scenes = self.run_scenes_stage(job, cancel, &mut result).await?;
            ctx.store.save_scenes(&job.id, &scenes).await?;
            result.scenes = scenes;
        }
        self.publish_stage(job, PipelineStage::Scenes, "scenes detected").await;

        // 7. Classify (failures yield an empty artifact)
        self.check_cancel(cancel)?;
        if job.options.classify_content {
            match self.run_classify_stage(&mut result).await {
                Ok(()) => {}
                Err(e) => log.warn("classify", &format!("continuing unclassified: {}", e)),
            }
        }
        self.publish_stage(job, PipelineStage::Classify, "content classified").await;

        // 8. Summarize (failures yield an empty artifact)
        self.check_cancel(cancel)?;
        if job.options.generate_summary {
            match self.run_summarize_stage(job, &mut result).await {
                Ok(()) => {}
                Err(e) => log.warn("summarize", &format!("continuing without summary: {}", e)),
            }
        }
        self.publish_stage(job, PipelineStage::Summarize, "summary generated").await;

        // 9. Persist
        self.check_cancel(cancel)?;
        result.elapsed_sec = started.elapsed().as_secs_f64();
        self.run_persist_stage(job, &mut result).await?;
        self.publish_stage(job, PipelineStage::Persist, "result persisted").await;

        log.stage("persist", "pipeline complete");
        Ok(result)
    }

    /// Discard partial artifacts after a cancellation, including any
    /// transcript memoized while the cancelled attempt ran.
    pub async fn discard_artifacts(&self, job: &Job) {
        if let Err(e) = self.ctx.store.discard(&job.id).await {
            warn!(job_id = %job.id, error = %e, "Failed to discard partial artifacts");
        }
        if let Err(e) = self
            .ctx
            .cacher
            .invalidate_by_pattern(&transcript_cache_key(&job.reference))
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to invalidate transcript cache");
        }
    }

    // ========================================================================
    // Stages
    // ========================================================================

    async fn run_frames_stage(
        &self,
        job: &Job,
        cancel: &CancelToken,
        path: &std::path::Path,
        result: &mut ProcessingResult,
    ) -> WorkerResult<Vec<Frame>> {
        let ctx = &self.ctx;
        let opts = &job.options;

        let extracted = ctx
            .decoder
            .extract_frames(
                path,
                opts.frame_sampling_mode,
                opts.frame_sample_rate,
                opts.max_frames,
            )
            .await?;
        debug!(job_id = %job.id, count = extracted.len(), "Frames extracted");

        let semaphore = Arc::new(Semaphore::new(ctx.config.frame_concurrency));
        let mut tasks: JoinSet<WorkerResult<(Frame, Vec<ModelUsage>)>> = JoinSet::new();

        let prompt = opts
            .custom_analysis
            .clone()
            .unwrap_or_else(|| ctx.config.vision_prompt.clone());

        for frame in extracted {
            self.check_cancel(cancel)?;

            let semaphore = Arc::clone(&semaphore);
            let model = ctx.model.clone();
            let cancel = cancel.clone();
            let job_id = job.id.clone();
            let prompt = prompt.clone();
            let max_tokens = ctx.config.vision_max_tokens;
            let detect_objects = opts.detect_objects;
            let extract_text = opts.extract_text;

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| WorkerError::Cancelled)?;
                if cancel.is_cancelled() {
                    return Err(WorkerError::Cancelled);
                }

                let mut usage = Vec::new();
                let image_b64 = {
                    use base64::Engine;
                    base64::engine::general_purpose::STANDARD.encode(&frame.data)
                };

                let vision_started = Instant::now();
                let response = model
                    .vision(&image_b64, &prompt, max_tokens)
                    .await
                    .map_err(WorkerError::from_model)?;
                usage.push(ModelUsage {
                    model: response.model.clone(),
                    operation: "vision".to_string(),
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                    elapsed_ms: vision_started.elapsed().as_millis() as u64,
                });

                let analysis = parse_vision_response(&response.content);

                let embed_started = Instant::now();
                let embedding = model
                    .embedding(&analysis.description, EmbeddingKind::Document)
                    .await
                    .map_err(WorkerError::from_model)?;
                usage.push(ModelUsage {
                    model: String::new(),
                    operation: "embedding".to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    elapsed_ms: embed_started.elapsed().as_millis() as u64,
                });

                let mut out = Frame::new(job_id, frame.frame_number, frame.timestamp_sec);
                out.description = analysis.description;
                out.embedding = Some(embedding);
                if detect_objects {
                    out.objects = analysis.objects;
                }
                if extract_text {
                    out.text_regions = analysis.text_regions;
                }

                Ok((out, usage))
            });
        }

        let mut frames = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (frame, usage) = joined
                .map_err(|e| WorkerError::invariant(format!("frame task panicked: {}", e)))??;

            let event =
                BusMessage::frame_event(job.id.clone(), frame.frame_number, frame.description.clone());
            if let Err(e) = self.ctx.bus.publish(&frames_topic(job.id.as_str()), &event).await {
                warn!(job_id = %job.id, error = %e, "Failed to publish frame event");
            }

            result.model_usage.extend(usage);
            frames.push(frame);
        }

        // Batch workers finish out of order; artifacts are frame-ordered.
        frames.sort_by_key(|f| f.frame_number);
        Ok(frames)
    }

    async fn run_audio_stage(
        &self,
        job: &Job,
        path: &std::path::Path,
        result: &mut ProcessingResult,
    ) -> WorkerResult<()> {
        let ctx = &self.ctx;
        let audio_path = ctx.decoder.extract_audio(path).await?;

        if job.options.transcribe_audio {
            let started = Instant::now();
            let audio_str = audio_path.to_string_lossy().to_string();

            // Transcripts are memoized per source reference so a retry
            // does not redo an hour of audio.
            let model = ctx.model.clone();
            let languages = job.options.target_languages.clone();
            let analysis = ctx
                .cacher
                .get_or_compute(
                    &transcript_cache_key(&job.reference),
                    std::time::Duration::from_secs(3600),
                    || async move {
                        model
                            .transcription(
                                &audio_str,
                                TranscriptionOptions {
                                    diarization: true,
                                    languages,
                                },
                            )
                            .await
                    },
                )
                .await
                .map_err(WorkerError::from_model)?;

            result.model_usage.push(ModelUsage {
                model: String::new(),
                operation: "transcription".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            ctx.store.save_audio(&job.id, &analysis).await?;
            result.audio = Some(analysis);
        }

        Ok(())
    }

    async fn run_scenes_stage(
        &self,
        job: &Job,
        cancel: &CancelToken,
        result: &mut ProcessingResult,
    ) -> WorkerResult<Vec<Scene>> {
        let frames = &result.frames;

        // Frame-ordered artifacts require every frame to be embedded.
        let embeddings: Vec<Vec<f32>> = frames
            .iter()
            .map(|f| {
                f.embedding
                    .clone()
                    .ok_or_else(|| WorkerError::invariant("frame missing embedding before scenes"))
            })
            .collect::<WorkerResult<_>>()?;

        let ranges = detect_scenes(&embeddings, &SceneConfig::default());
        let confidences: Vec<f32> = frames.iter().map(frame_confidence).collect();

        let mut scenes = Vec::with_capacity(ranges.len());
        for (ordinal, range) in ranges.iter().enumerate() {
            self.check_cancel(cancel)?;

            let start = range.start as usize;
            let end = range.end as usize;
            let scene_embedding = aggregate_embeddings(
                &embeddings[start..end],
                &confidences[start..end],
                self.ctx.config.aggregation,
            )?;

            let duration_sec = scene_duration(&frames[start..end]);
            let descriptors = scene_descriptors(&frames[start..end], &embeddings[start..end], result);

            let scene = Scene {
                job_id: job.id.clone(),
                ordinal: ordinal as u32,
                start_frame: frames[start].frame_number,
                end_frame: frames[end - 1].frame_number + 1,
                duration_sec,
                embedding: Some(scene_embedding),
                descriptors,
                shots: range.shots.clone(),
            };

            let event = BusMessage::scene_event(
                job.id.clone(),
                scene.ordinal,
                scene.start_frame,
                scene.end_frame,
            );
            if let Err(e) = self.ctx.bus.publish(&scenes_topic(job.id.as_str()), &event).await {
                warn!(job_id = %job.id, error = %e, "Failed to publish scene event");
            }

            scenes.push(scene);
        }

        // Scene-based sampling materialises at keyframes, then trims to
        // the shot anchors once scenes are known.
        if job.options.frame_sampling_mode == vagent_models::FrameSamplingMode::SceneBased {
            let keep = scene_based_retention(&ranges);
            result
                .frames
                .retain(|f| keep.contains(&f.frame_number));
        }

        Ok(scenes)
    }

    async fn run_classify_stage(&self, result: &mut ProcessingResult) -> WorkerResult<()> {
        let descriptions: Vec<String> = result
            .frames
            .iter()
            .map(|f| f.description.clone())
            .filter(|d| !d.is_empty())
            .collect();

        let started = Instant::now();
        let classification = self
            .ctx
            .model
            .classification(&ClassificationRequest {
                descriptions,
                transcript: result.audio.as_ref().map(|a| a.transcription.clone()),
            })
            .await
            .map_err(WorkerError::from_model)?;

        result.model_usage.push(ModelUsage {
            model: String::new(),
            operation: "classification".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        result.classification = Some(classification);
        Ok(())
    }

    async fn run_summarize_stage(
        &self,
        job: &Job,
        result: &mut ProcessingResult,
    ) -> WorkerResult<()> {
        let mut sources = sample_descriptions(&result.frames, 5);
        sources.push(format!(
            "Video: {}x{}, {:.1}s, {} fps, codec {}",
            result.metadata.width,
            result.metadata.height,
            result.metadata.duration_sec,
            result.metadata.fps,
            result.metadata.codec
        ));
        if let Some(audio) = &result.audio {
            sources.push(audio.transcription.clone());
        }

        let kind = if job.options.custom_analysis.is_some() {
            SynthesisKind::Custom
        } else {
            SynthesisKind::Summary
        };

        let started = Instant::now();
        let summary = self
            .ctx
            .model
            .synthesis(sources, kind)
            .await
            .map_err(WorkerError::from_model)?;

        result.model_usage.push(ModelUsage {
            model: String::new(),
            operation: "synthesis".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        result.summary = Some(summary);
        Ok(())
    }

    async fn run_persist_stage(
        &self,
        job: &Job,
        result: &mut ProcessingResult,
    ) -> WorkerResult<()> {
        let ctx = &self.ctx;

        ctx.store
            .save_result(result)
            .await
            .map_err(|e| WorkerError::store(e.to_string()))?;

        if result.frames.is_empty() {
            return Ok(());
        }

        let embeddings: Vec<Vec<f32>> = result
            .frames
            .iter()
            .filter_map(|f| f.embedding.clone())
            .collect();
        let confidences: Vec<f32> = result.frames.iter().map(frame_confidence).collect();

        let video_vector =
            aggregate_embeddings(&embeddings, &confidences, ctx.config.aggregation)?;
        let hash = content_hash(&video_vector);

        let tags = result
            .classification
            .as_ref()
            .map(|c| c.tags.clone())
            .unwrap_or_default();
        let scene_types: Vec<String> = result
            .scenes
            .iter()
            .flat_map(|s| s.descriptors.visual.iter().take(1).cloned())
            .collect();

        let now_ms = chrono::Utc::now().timestamp_millis();
        let video_embedding = VideoEmbedding::new(
            job.id.as_str(),
            video_vector,
            VideoPayload {
                video_id: job.id.to_string(),
                user_id: job.user_id.clone(),
                duration_sec: result.metadata.duration_sec,
                scene_types: scene_types.clone(),
                tags: tags.clone(),
                dominant_colors: Vec::new(),
                color_profile: None,
                content_hash: hash,
                created_at_ms: now_ms,
            },
        );
        ctx.index.upsert_video(&video_embedding).await?;

        let scene_embeddings: Vec<SceneEmbedding> = result
            .scenes
            .iter()
            .filter_map(|scene| {
                let vector = scene.embedding.clone()?;
                let hash = content_hash(&vector);
                Some(SceneEmbedding::new(
                    job.id.as_str(),
                    scene.ordinal,
                    vector,
                    ScenePayload {
                        video_id: job.id.to_string(),
                        user_id: job.user_id.clone(),
                        scene_ordinal: scene.ordinal,
                        start_frame: scene.start_frame,
                        end_frame: scene.end_frame,
                        duration_sec: scene.duration_sec,
                        scene_type: scene.descriptors.visual.first().cloned(),
                        tags: tags.clone(),
                        content_hash: hash,
                        created_at_ms: now_ms,
                    },
                ))
            })
            .collect();
        if !scene_embeddings.is_empty() {
            ctx.index.upsert_scenes_batch(&scene_embeddings).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_cancel(&self, cancel: &CancelToken) -> WorkerResult<()> {
        if cancel.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    async fn publish_started(&self, job: &Job) {
        let message = BusMessage::ProgressUpdate {
            job_id: job.id.clone(),
            progress: 0,
            stage: PipelineStage::Prepare,
            message: "processing started".to_string(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self
            .ctx
            .bus
            .publish(&progress_topic(job.id.as_str()), &message)
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to publish start progress");
        }
    }

    async fn publish_stage(&self, job: &Job, stage: PipelineStage, message: &str) {
        let update = BusMessage::progress_update(job.id.clone(), stage, message);
        if let Err(e) = self
            .ctx
            .bus
            .publish(&progress_topic(job.id.as_str()), &update)
            .await
        {
            warn!(job_id = %job.id, stage = stage.as_str(), error = %e, "Failed to publish progress");
        }
        if let Err(e) = self
            .ctx
            .queue
            .update_progress(&job.id, stage.progress_anchor())
            .await
        {
            warn!(job_id = %job.id, error = %e, "Failed to update job progress");
        }
    }
}

/// Frame confidence for attention aggregation: the strongest detection.
fn frame_confidence(frame: &Frame) -> f32 {
    frame
        .objects
        .iter()
        .map(|o| o.confidence)
        .fold(0.0f32, f32::max)
}

/// Wall-clock span of a frame run.
fn scene_duration(frames: &[Frame]) -> f64 {
    match (frames.first(), frames.last()) {
        (Some(first), Some(last)) if frames.len() > 1 => {
            (last.timestamp_sec - first.timestamp_sec).max(0.0)
        }
        (Some(_), _) => 1.0,
        _ => 0.0,
    }
}

/// Aggregate descriptors for a scene's frame run.
fn scene_descriptors(
    frames: &[Frame],
    embeddings: &[Vec<f32>],
    result: &ProcessingResult,
) -> SceneDescriptors {
    // Most frequent visual labels across the run.
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for frame in frames {
        for object in &frame.objects {
            *counts.entry(object.label.as_str()).or_default() += 1;
        }
    }
    let mut visual: Vec<(&str, usize)> = counts.into_iter().collect();
    visual.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let visual: Vec<String> = visual.into_iter().take(5).map(|(l, _)| l.to_string()).collect();

    // Audio keywords from transcript segments overlapping the run.
    let audio = match (&result.audio, frames.first(), frames.last()) {
        (Some(analysis), Some(first), Some(last)) => {
            let segments = analysis.segments_in_range(first.timestamp_sec, last.timestamp_sec + 1.0);
            let mut keywords: Vec<String> = analysis
                .keywords
                .iter()
                .filter(|k| segments.iter().any(|s| s.text.contains(k.as_str())))
                .cloned()
                .collect();
            keywords.truncate(5);
            keywords
        }
        _ => Vec::new(),
    };

    // Mean adjacent dissimilarity as a motion proxy.
    let motion = if embeddings.len() > 1 {
        let total: f32 = embeddings
            .windows(2)
            .map(|w| 1.0 - cosine_similarity(&w[0], &w[1]))
            .sum();
        (total / (embeddings.len() - 1) as f32).clamp(0.0, 1.0)
    } else {
        0.0
    };

    SceneDescriptors {
        visual,
        audio,
        motion,
    }
}

/// Frames retained for scene-based sampling: every shot anchor.
fn scene_based_retention(ranges: &[SceneRange]) -> HashSet<u64> {
    let mut keep = HashSet::new();
    for range in ranges {
        keep.insert(range.start);
        for shot in &range.shots {
            keep.insert(shot.start_frame);
        }
    }
    keep
}

/// Up to `count` descriptions sampled uniformly across the video.
fn sample_descriptions(frames: &[Frame], count: usize) -> Vec<String> {
    if frames.is_empty() || count == 0 {
        return Vec::new();
    }
    if frames.len() <= count {
        return frames.iter().map(|f| f.description.clone()).collect();
    }

    let step = frames.len() as f64 / count as f64;
    (0..count)
        .map(|i| frames[(i as f64 * step) as usize].description.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vagent_models::JobId;

    fn frame(n: u64, description: &str) -> Frame {
        let mut f = Frame::new(JobId::from_string("j1"), n, n as f64);
        f.description = description.to_string();
        f
    }

    #[test]
    fn sampling_is_uniform() {
        let frames: Vec<Frame> = (0..50).map(|n| frame(n, &format!("d{}", n))).collect();
        let sampled = sample_descriptions(&frames, 5);
        assert_eq!(sampled.len(), 5);
        assert_eq!(sampled[0], "d0");
        assert_eq!(sampled[1], "d10");
        assert_eq!(sampled[4], "d40");
    }

    #[test]
    fn sampling_short_input_returns_all() {
        let frames: Vec<Frame> = (0..3).map(|n| frame(n, &format!("d{}", n))).collect();
        assert_eq!(sample_descriptions(&frames, 5).len(), 3);
    }

    #[test]
    fn scene_duration_spans_timestamps() {
        let frames: Vec<Frame> = (10..20).map(|n| frame(n, "x")).collect();
        assert_eq!(scene_duration(&frames), 9.0);
        assert_eq!(scene_duration(&frames[..1]), 1.0);
        assert_eq!(scene_duration(&[]), 0.0);
    }

    #[test]
    fn retention_keeps_shot_anchors() {
        let ranges = vec![
            SceneRange {
                start: 0,
                end: 60,
                shots: vec![
                    vagent_models::Shot {
                        start_frame: 0,
                        end_frame: 30,
                    },
                    vagent_models::Shot {
                        start_frame: 30,
                        end_frame: 60,
                    },
                ],
            },
            SceneRange {
                start: 60,
                end: 100,
                shots: vec![vagent_models::Shot {
                    start_frame: 60,
                    end_frame: 100,
                }],
            },
        ];

        let keep = scene_based_retention(&ranges);
        assert!(keep.contains(&0));
        assert!(keep.contains(&30));
        assert!(keep.contains(&60));
        assert!(!keep.contains(&10));
    }

    #[test]
    fn frame_confidence_is_strongest_detection() {
        let mut f = frame(0, "x");
        assert_eq!(frame_confidence(&f), 0.0);

        f.objects.push(vagent_models::DetectedObject {
            label: "cat".to_string(),
            confidence: 0.4,
            bbox: vagent_models::NormalizedRect::new(0.0, 0.0, 1.0, 1.0),
        });
        f.objects.push(vagent_models::DetectedObject {
            label: "dog".to_string(),
            confidence: 0.9,
            bbox: vagent_models::NormalizedRect::new(0.0, 0.0, 1.0, 1.0),
        });
        assert_eq!(frame_confidence(&f), 0.9);
    }
}
