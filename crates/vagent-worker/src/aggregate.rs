//! Aggregation of frame embeddings and content hashing.

use sha2::{Digest, Sha256};

use vagent_models::AggregationMethod;

use crate::error::{WorkerError, WorkerResult};

/// Aggregate frame embeddings into a single vector.
///
/// `confidences` is consulted only by the attention method; when every
/// weight is zero it falls back to uniform weights.
pub fn aggregate_embeddings(
    embeddings: &[Vec<f32>],
    confidences: &[f32],
    method: AggregationMethod,
) -> WorkerResult<Vec<f32>> {
    let Some(first) = embeddings.first() else {
        return Err(WorkerError::invariant(
            "cannot aggregate an empty embedding set",
        ));
    };
    let dim = first.len();
    if embeddings.iter().any(|e| e.len() != dim) {
        return Err(WorkerError::invariant(
            "embedding dimensions differ within a job",
        ));
    }

    let aggregated = match method {
        AggregationMethod::Mean => {
            let mut sum = vec![0.0f32; dim];
            for e in embeddings {
                for (acc, v) in sum.iter_mut().zip(e.iter()) {
                    *acc += v;
                }
            }
            let n = embeddings.len() as f32;
            sum.iter_mut().for_each(|v| *v /= n);
            sum
        }
        AggregationMethod::Max => {
            let mut max = vec![f32::MIN; dim];
            for e in embeddings {
                for (acc, v) in max.iter_mut().zip(e.iter()) {
                    *acc = acc.max(*v);
                }
            }
            max
        }
        AggregationMethod::Attention => {
            let total: f32 = confidences.iter().take(embeddings.len()).sum();
            let n = embeddings.len() as f32;

            let mut sum = vec![0.0f32; dim];
            for (i, e) in embeddings.iter().enumerate() {
                // Uniform fallback when all weights are zero.
                let weight = if total > 0.0 {
                    confidences.get(i).copied().unwrap_or(0.0) / total
                } else {
                    1.0 / n
                };
                for (acc, v) in sum.iter_mut().zip(e.iter()) {
                    *acc += weight * v;
                }
            }
            sum
        }
    };

    Ok(aggregated)
}

/// SHA-256 of the little-endian IEEE-754 byte image of a vector,
/// stored as the content hash.
pub fn content_hash(vector: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for value in vector {
        hasher.update(value.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_aggregation() {
        let embeddings = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let out = aggregate_embeddings(&embeddings, &[], AggregationMethod::Mean).unwrap();
        assert_eq!(out, vec![2.0, 3.0]);
    }

    #[test]
    fn max_aggregation() {
        let embeddings = vec![vec![1.0, 4.0], vec![3.0, 2.0]];
        let out = aggregate_embeddings(&embeddings, &[], AggregationMethod::Max).unwrap();
        assert_eq!(out, vec![3.0, 4.0]);
    }

    #[test]
    fn attention_weights_by_confidence() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let out =
            aggregate_embeddings(&embeddings, &[3.0, 1.0], AggregationMethod::Attention).unwrap();
        assert!((out[0] - 0.75).abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn attention_zero_weights_fall_back_to_uniform() {
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let out =
            aggregate_embeddings(&embeddings, &[0.0, 0.0], AggregationMethod::Attention).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_set_is_an_invariant_violation() {
        let err = aggregate_embeddings(&[], &[], AggregationMethod::Mean).unwrap_err();
        assert!(matches!(err, WorkerError::Invariant(_)));
    }

    #[test]
    fn mismatched_dims_are_rejected() {
        let embeddings = vec![vec![1.0, 2.0], vec![1.0]];
        let err = aggregate_embeddings(&embeddings, &[], AggregationMethod::Mean).unwrap_err();
        assert!(matches!(err, WorkerError::Invariant(_)));
    }

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        let v1 = vec![0.1f32, 0.2, 0.3];
        let v2 = vec![0.1f32, 0.2, 0.3];
        let v3 = vec![0.1f32, 0.2, 0.30001];

        assert_eq!(content_hash(&v1), content_hash(&v2));
        assert_ne!(content_hash(&v1), content_hash(&v3));
        assert_eq!(content_hash(&v1).len(), 64);
    }
}
