use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Insertion order of the matched vector.
    pub position: usize,
    pub score: f32,
}

/// Exhaustive inner-product index over row-major `f32` vectors.
///
/// With unit-length inputs the score is cosine similarity.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            return 0;
        }
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some((idx, bad)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != self.dim)
        {
            return Err(anyhow!(
                "vector {idx} has dimension {} but index expects {}",
                bad.len(),
                self.dim
            ));
        }
        self.data.reserve(vectors.len() * self.dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    /// Top `k` stored vectors by inner product with `query`, best first.
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            return Err(anyhow!(
                "query has dimension {} but index expects {}",
                query.len(),
                self.dim
            ));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, row)| SearchHit {
                position,
                score: row.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);
        tracing::trace!(candidates = self.len(), returned = hits.len(), "flat search");
        Ok(hits)
    }
}
