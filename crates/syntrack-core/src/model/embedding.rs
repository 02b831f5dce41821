use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

/// An ordered sequence of embedding frames with their timestamps.
///
/// Row `i` of `vectors` is the embedding of the audio frame starting at
/// `timestamps[i]` seconds. The sequence is validated on construction and
/// immutable afterwards:
///
/// - `vectors.nrows() == timestamps.len()`
/// - at least one frame, and a non-zero dimensionality
/// - every value finite, timestamps non-decreasing
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSequence {
    vectors: Array2<f32>,
    timestamps: Vec<f64>,
}

impl EmbeddingSequence {
    /// Build a sequence from an `N x D` matrix and `N` timestamps.
    pub fn new(vectors: Array2<f32>, timestamps: Vec<f64>) -> Result<Self> {
        if vectors.nrows() != timestamps.len() {
            return Err(Error::InvalidSequence(format!(
                "{} vectors but {} timestamps",
                vectors.nrows(),
                timestamps.len()
            )));
        }
        if vectors.nrows() == 0 {
            return Err(Error::InvalidSequence("no frames".to_string()));
        }
        if vectors.ncols() == 0 {
            return Err(Error::InvalidSequence("zero-dimensional vectors".to_string()));
        }
        if vectors.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidSequence("non-finite vector value".to_string()));
        }
        if timestamps.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidSequence("non-finite timestamp".to_string()));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::InvalidSequence(format!(
                "timestamps decrease at frame {}",
                pos + 1
            )));
        }

        Ok(Self {
            vectors,
            timestamps,
        })
    }

    /// Build a sequence from a flat row-major buffer of `N * dim` values.
    pub fn from_flat(data: Vec<f32>, dim: usize, timestamps: Vec<f64>) -> Result<Self> {
        let rows = timestamps.len();
        let vectors = Array2::from_shape_vec((rows, dim), data)
            .map_err(|e| Error::InvalidSequence(format!("bad shape {rows}x{dim}: {e}")))?;
        Self::new(vectors, timestamps)
    }

    /// Build a sequence from one vector per frame.
    pub fn from_rows(rows: Vec<Vec<f32>>, timestamps: Vec<f64>) -> Result<Self> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != dim) {
            return Err(Error::InvalidSequence(format!(
                "frame {bad} has {} values, expected {dim}",
                rows[bad].len()
            )));
        }
        let data = rows.into_iter().flatten().collect();
        Self::from_flat(data, dim, timestamps)
    }

    /// Build a sequence whose timestamps sit on a regular `hop_secs` grid
    /// starting at zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn on_grid(vectors: Array2<f32>, hop_secs: f64) -> Result<Self> {
        let timestamps = (0..vectors.nrows()).map(|i| i as f64 * hop_secs).collect();
        Self::new(vectors, timestamps)
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false` for a validated sequence; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Dimensionality of each embedding vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    #[must_use]
    pub fn vectors(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> ArrayView1<'_, f32> {
        self.vectors.row(index)
    }

    #[must_use]
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Duration covered by the sequence, measured to the last frame start.
    #[must_use]
    pub fn span_secs(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}
