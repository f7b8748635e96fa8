//! Exact inner-product index over unit vectors.
//!
//! Rows live contiguously in one `Vec<f32>`; row `i` is
//! `data[i * dim..(i + 1) * dim]`. Search is a full scan, which is fine for
//! the corpus sizes a single-process document store holds.

use std::cmp::Ordering;

use crate::error::{RagError, Result};

const MAGIC: &[u8; 4] = b"RQIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
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
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dim);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub(crate) fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows * self.dim);
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }

    /// Highest inner-product rows first. Returns at most `min(top_k, len)` hits.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Hit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(index, row)| Hit {
                index,
                score: row.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();

        // Ties keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(RagError::IndexCorruption(
                "index file has no valid header".to_string(),
            ));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(RagError::IndexCorruption(format!(
                "unsupported index format version {}",
                version
            )));
        }
        let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..HEADER_LEN]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::IndexCorruption("index size overflows".to_string()))?;
        if body.len() != expected {
            return Err(RagError::IndexCorruption(format!(
                "index body is {} bytes, expected {} for {} rows of dim {}",
                body.len(),
                expected,
                count,
                dim
            )));
        }

        let mut data = Vec::with_capacity(count * dim);
        for chunk in body.chunks_exact(4) {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if !value.is_finite() {
                return Err(RagError::IndexCorruption(
                    "index contains a non-finite value".to_string(),
                ));
            }
            data.push(value);
        }
        Ok(Self { dim, data })
    }
}
