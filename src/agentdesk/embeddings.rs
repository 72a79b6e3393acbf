//! Text embeddings and vector distance.

use crate::agentdesk::faq_memory::FaqError;
use async_trait::async_trait;
use std::error::Error;

/// Turns text into fixed-size vectors.
///
/// Implemented by [`AzureOpenAIEmbedder`](crate::clients::azure_openai::AzureOpenAIEmbedder);
/// tests substitute deterministic fakes.
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Box<dyn Error + Send + Sync>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, Box<dyn Error + Send + Sync>> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| "embedding service returned no vectors".into())
    }
}

/// `1 - cos(a, b)`: 0 for identical direction, 1 for orthogonal, 2 for opposite.
///
/// A zero vector has no direction and is treated as maximally unrelated (distance 1.0).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32, FaqError> {
    if a.len() != b.len() {
        return Err(FaqError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(1.0);
    }
    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    Ok((1.0 - cosine) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_bounds() {
        assert!(cosine_distance(&[1.0, 2.0], &[2.0, 4.0]).unwrap().abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 3.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_unrelated() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            cosine_distance(&[1.0], &[1.0, 0.0]),
            Err(FaqError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }
}
