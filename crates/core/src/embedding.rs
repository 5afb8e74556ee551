use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            seed: 1337,
        }
    }
}

/// Feature-hashing bag of words. Deterministic, offline, and good enough to
/// rank chunks that share vocabulary with a question.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        for token in text.split_whitespace().filter_map(clean_token) {
            let (bucket, sign) = self.bucket_for(&token);
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.hash(&mut hasher);
        let hash = hasher.finish();
        let bucket = (hash as usize) % self.dimensions();
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

fn clean_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Scales `vector` to unit length. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
