//! In-process embedding model.
//!
//! A deterministic hashed-projection embedder: every token maps to a
//! seeded pseudo-random projection vector, token projections are
//! mean-pooled and the result L2-normalized. No network, no model files,
//! stable across runs — which keeps ingestion and retrieval usable fully
//! offline and makes similarity scores reproducible in tests.

use ndarray::Array1;
use sha2::{Digest, Sha256};

/// Output dimensionality of the local backend.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    /// Build the embedder. Called once behind the service's init guard.
    pub fn load() -> Self {
        Self {
            dim: LOCAL_EMBEDDING_DIM,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Embed one text: mean-pooled token projections, L2-normalized.
    ///
    /// Empty or token-free text yields the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.dim];
        }

        let mut acc = Array1::<f32>::zeros(self.dim);
        for token in &tokens {
            acc += &self.token_projection(token);
        }
        acc /= tokens.len() as f32;

        let norm = acc.dot(&acc).sqrt();
        if norm > f32::EPSILON {
            acc /= norm;
        }

        acc.to_vec()
    }

    /// Deterministic projection vector for one token.
    ///
    /// Counter-mode SHA-256 over the token expands to `dim` floats in
    /// [-1, 1): each 32-byte digest yields eight lanes.
    fn token_projection(&self, token: &str) -> Array1<f32> {
        let mut values = Vec::with_capacity(self.dim);
        let mut counter: u32 = 0;

        while values.len() < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();

            for lane in digest.chunks_exact(4) {
                if values.len() == self.dim {
                    break;
                }
                let raw = u32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                // Map the full u32 range onto [-1, 1).
                values.push((raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }

            counter += 1;
        }

        Array1::from_vec(values)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_has_fixed_dimension() {
        let embedder = LocalEmbedder::load();
        assert_eq!(embedder.embed("hello world").len(), LOCAL_EMBEDDING_DIM);
        assert_eq!(embedder.embed("").len(), LOCAL_EMBEDDING_DIM);
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = LocalEmbedder::load();
        assert_eq!(embedder.embed("same input"), embedder.embed("same input"));
    }

    #[test]
    fn non_empty_output_is_unit_length() {
        let embedder = LocalEmbedder::load();
        let v = embedder.embed("normalize me please");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = LocalEmbedder::load();
        assert!(embedder.embed("  \n ").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn word_order_is_ignored_by_mean_pooling() {
        let embedder = LocalEmbedder::load();
        assert_eq!(
            embedder.embed("alpha beta gamma"),
            embedder.embed("gamma alpha beta")
        );
    }

    #[test]
    fn similar_texts_score_higher_than_unrelated() {
        let embedder = LocalEmbedder::load();
        let a = embedder.embed("the cat sat on the mat");
        let b = embedder.embed("a cat sat on a mat");
        let c = embedder.embed("quarterly revenue grew eight percent");

        let sim = |x: &[f32], y: &[f32]| -> f32 {
            x.iter().zip(y).map(|(p, q)| p * q).sum()
        };
        assert!(sim(&a, &b) > sim(&a, &c));
    }
}
