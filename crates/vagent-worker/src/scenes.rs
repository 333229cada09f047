//! Scene and shot detection from frame embeddings.
//!
//! A boundary is declared where the cosine similarity between adjacent
//! frame embeddings drops below the scene threshold, subject to minimum
//! and maximum scene lengths. Boundaries partition
//! `[first_frame, last_frame]` into contiguous non-overlapping ranges;
//! the last frame closes the final scene. Within a scene, a finer
//! threshold with a smaller minimum delimits shots.

use vagent_models::Shot;

/// Detection tuning.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Boundary when adjacent cosine drops below this
    pub scene_threshold: f32,
    /// Minimum scene length in frames
    pub min_scene_length: u64,
    /// Maximum scene length in frames
    pub max_scene_length: u64,
    /// Intra-scene shot boundary threshold
    pub shot_threshold: f32,
    /// Minimum shot length in frames
    pub min_shot_length: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            scene_threshold: 0.7,
            min_scene_length: 30,
            max_scene_length: 900,
            shot_threshold: 0.85,
            min_shot_length: 5,
        }
    }
}

/// A detected scene range with its shots. Frame numbers are indices
/// into the embedding slice; `end` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRange {
    pub start: u64,
    pub end: u64,
    pub shots: Vec<Shot>,
}

impl SceneRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Cosine similarity between two vectors; 0.0 for degenerate input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Detect scenes over consecutive frame embeddings.
///
/// Returns contiguous `[boundary_i, boundary_{i+1})` ranges covering
/// every frame exactly once. Empty input yields no scenes; a single
/// frame yields one single-frame scene.
pub fn detect_scenes(embeddings: &[Vec<f32>], config: &SceneConfig) -> Vec<SceneRange> {
    let n = embeddings.len() as u64;
    if n == 0 {
        return Vec::new();
    }

    let mut boundaries: Vec<u64> = vec![0];
    let mut scene_start = 0u64;

    for i in 1..n {
        let current_len = i - scene_start;
        let similarity = cosine_similarity(
            &embeddings[(i - 1) as usize],
            &embeddings[i as usize],
        );

        let drop = similarity < config.scene_threshold && current_len >= config.min_scene_length;
        let overrun = current_len >= config.max_scene_length;

        if drop || overrun {
            boundaries.push(i);
            scene_start = i;
        }
    }

    let mut scenes = Vec::with_capacity(boundaries.len());
    for (idx, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(idx + 1).copied().unwrap_or(n);
        let shots = detect_shots(embeddings, start, end, config);
        scenes.push(SceneRange { start, end, shots });
    }

    scenes
}

/// Detect shots within `[start, end)` using the finer threshold.
fn detect_shots(embeddings: &[Vec<f32>], start: u64, end: u64, config: &SceneConfig) -> Vec<Shot> {
    let mut cuts: Vec<u64> = vec![start];
    let mut shot_start = start;

    for i in (start + 1)..end {
        let current_len = i - shot_start;
        let similarity = cosine_similarity(
            &embeddings[(i - 1) as usize],
            &embeddings[i as usize],
        );

        if similarity < config.shot_threshold && current_len >= config.min_shot_length {
            cuts.push(i);
            shot_start = i;
        }
    }

    cuts.iter()
        .enumerate()
        .map(|(idx, &s)| Shot {
            start_frame: s,
            end_frame: cuts.get(idx + 1).copied().unwrap_or(end),
        })
        .collect()
}

/// Verify the partition invariant: contiguous, non-overlapping,
/// covering `[0, frame_count)`.
pub fn is_valid_partition(scenes: &[SceneRange], frame_count: u64) -> bool {
    if frame_count == 0 {
        return scenes.is_empty();
    }
    if scenes.is_empty() || scenes[0].start != 0 {
        return false;
    }
    for window in scenes.windows(2) {
        if window[0].end != window[1].start {
            return false;
        }
    }
    scenes.last().map(|s| s.end) == Some(frame_count)
        && scenes.iter().all(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two nearly-orthogonal unit vectors with cosine of about 0.2.
    fn vectors_ab() -> (Vec<f32>, Vec<f32>) {
        // a = (1, 0), b = (0.2, sqrt(1 - 0.04)) in the first two dims.
        let mut a = vec![0.0f32; 8];
        let mut b = vec![0.0f32; 8];
        a[0] = 1.0;
        b[0] = 0.2;
        b[1] = (1.0f32 - 0.04).sqrt();
        (a, b)
    }

    #[test]
    fn cosine_basics() {
        let (a, b) = vectors_ab();
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&a, &b) - 0.2).abs() < 1e-5);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0; 8], &a), 0.0);
    }

    #[test]
    fn cosine_bounds() {
        let (a, b) = vectors_ab();
        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        let s = cosine_similarity(&a, &neg);
        assert!((-1.0..=1.0).contains(&s));
        assert!((s + 1.0).abs() < 1e-6);
        assert!((-1.0..=1.0).contains(&cosine_similarity(&a, &b)));
    }

    #[test]
    fn aba_sequence_yields_three_scenes() {
        // Frames 0-59 = A, 60-119 = B, 120-179 = A; AxB cosine = 0.2.
        let (a, b) = vectors_ab();
        let mut embeddings = Vec::with_capacity(180);
        for _ in 0..60 {
            embeddings.push(a.clone());
        }
        for _ in 0..60 {
            embeddings.push(b.clone());
        }
        for _ in 0..60 {
            embeddings.push(a.clone());
        }

        let scenes = detect_scenes(&embeddings, &SceneConfig::default());

        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].start, 0);
        assert_eq!(scenes[1].start, 60);
        assert_eq!(scenes[2].start, 120);
        assert_eq!(scenes[2].end, 180);
        assert!(scenes.iter().all(|s| s.len() >= 30));
        assert!(is_valid_partition(&scenes, 180));
    }

    #[test]
    fn uniform_video_is_one_scene() {
        let (a, _) = vectors_ab();
        let embeddings = vec![a; 100];
        let scenes = detect_scenes(&embeddings, &SceneConfig::default());
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].start, 0);
        assert_eq!(scenes[0].end, 100);
    }

    #[test]
    fn min_scene_length_suppresses_early_boundary() {
        let (a, b) = vectors_ab();
        // Dissimilar frame at index 10, before min length is reached.
        let mut embeddings = vec![a.clone(); 10];
        embeddings.push(b.clone());
        embeddings.extend(vec![a; 49]);

        let scenes = detect_scenes(&embeddings, &SceneConfig::default());
        assert_eq!(scenes.len(), 1);
        assert!(is_valid_partition(&scenes, 60));
    }

    #[test]
    fn max_scene_length_forces_split() {
        let (a, _) = vectors_ab();
        let embeddings = vec![a; 1000];
        let scenes = detect_scenes(&embeddings, &SceneConfig::default());
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].end, 900);
        assert!(is_valid_partition(&scenes, 1000));
    }

    #[test]
    fn single_frame_is_one_scene() {
        let (a, _) = vectors_ab();
        let scenes = detect_scenes(&[a], &SceneConfig::default());
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].len(), 1);
        assert!(is_valid_partition(&scenes, 1));
    }

    #[test]
    fn empty_input_yields_no_scenes() {
        let scenes = detect_scenes(&[], &SceneConfig::default());
        assert!(scenes.is_empty());
        assert!(is_valid_partition(&scenes, 0));
    }

    #[test]
    fn shots_partition_their_scene() {
        // A cut at frame 20 is below the scene minimum, so it stays one
        // scene but splits into shots at the finer threshold.
        let (a, b) = vectors_ab();
        let mut embeddings = vec![a.clone(); 20];
        embeddings.extend(vec![b; 20]);

        let scenes = detect_scenes(&embeddings, &SceneConfig::default());
        assert_eq!(scenes.len(), 1);
        let shots = &scenes[0].shots;
        assert!(shots.len() >= 2);
        assert_eq!(shots[0].start_frame, 0);
        assert_eq!(shots.last().unwrap().end_frame, 40);
        for w in shots.windows(2) {
            assert_eq!(w[0].end_frame, w[1].start_frame);
        }
    }
}
