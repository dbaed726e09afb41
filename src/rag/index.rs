//! Flat squared-L2 vector index.
//!
//! Embeddings live in one `Array2<f32>` row per chunk; the chunk texts are
//! kept in a `Vec` in the same order. Both only ever grow together.

use ndarray::{aview1, concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Insertion ordinal of the chunk
    pub position: usize,
    pub text: String,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vectors: Option<Array2<f32>>,
    chunks: Vec<String>,
}

/// Layout-independent form of an index, used for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimension: usize,
    pub chunks: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector width, fixed by the first insertion.
    pub fn dimension(&self) -> Option<usize> {
        self.vectors.as_ref().map(|v| v.ncols())
    }

    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// Appends chunks with their embeddings.
    ///
    /// The whole batch is checked before anything is stored, so a rejected
    /// batch leaves the index untouched.
    pub fn add(&mut self, chunks: Vec<String>, embeddings: Vec<Vec<f32>>) -> Result<(), ApiError> {
        if chunks.len() != embeddings.len() {
            return Err(ApiError::BadRequest(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let width = match self.dimension() {
            Some(dim) => dim,
            None => embeddings[0].len(),
        };
        if width == 0 {
            return Err(ApiError::BadRequest("embeddings are empty".to_string()));
        }
        if let Some((i, bad)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != width) {
            return Err(ApiError::BadRequest(format!(
                "embedding {} has dimension {}, index expects {}",
                i,
                bad.len(),
                width
            )));
        }

        let rows = embeddings.len();
        let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
        let batch = Array2::from_shape_vec((rows, width), flat).map_err(ApiError::internal)?;

        let vectors = match self.vectors.take() {
            Some(existing) => concatenate(Axis(0), &[existing.view(), batch.view()])
                .map_err(ApiError::internal)?,
            None => batch,
        };
        self.vectors = Some(vectors);
        self.chunks.extend(chunks);
        Ok(())
    }

    /// The `k` nearest chunks by squared L2 distance, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, ApiError> {
        let Some(vectors) = &self.vectors else {
            return Ok(Vec::new());
        };
        if query.len() != vectors.ncols() {
            return Err(ApiError::BadRequest(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                vectors.ncols()
            )));
        }

        let diff = vectors - &aview1(query);
        let distances = diff.mapv(|x| x * x).sum_axis(Axis(1));

        let mut ranked: Vec<(usize, f32)> = distances.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(position, distance)| SearchHit {
                position,
                text: self.chunks[position].clone(),
                distance,
            })
            .collect())
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let vectors = self
            .vectors
            .as_ref()
            .map(|v| v.outer_iter().map(|row| row.to_vec()).collect())
            .unwrap_or_default();
        IndexSnapshot {
            dimension: self.dimension().unwrap_or(0),
            chunks: self.chunks.clone(),
            vectors,
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, ApiError> {
        if let Some(bad) = snapshot.vectors.iter().find(|v| v.len() != snapshot.dimension) {
            return Err(ApiError::BadRequest(format!(
                "snapshot vector has dimension {}, expected {}",
                bad.len(),
                snapshot.dimension
            )));
        }
        let mut index = Self::new();
        index.add(snapshot.chunks, snapshot.vectors)?;
        Ok(index)
    }
}

/// Little-endian `f32` blob.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, ApiError> {
    if bytes.len() % 4 != 0 {
        return Err(ApiError::Internal(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
