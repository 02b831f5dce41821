//! Nearest-neighbour voting alignment.
//!
//! Every clip frame votes for the reference frame closest to it in embedding
//! space; the reference frame with the most votes is the estimated offset.
//! A majority of agreeing frames outweighs a handful of outliers (silence,
//! crowd noise, transients), which a single global best match would not.

use ndarray::{Array2, ArrayView1, ArrayView2};
use thiserror::Error;

use crate::model::{AlignmentResult, EmbeddingSequence};

/// Errors that prevent two embedding sequences from being compared.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    /// The clip and reference vectors live in different embedding spaces.
    #[error("embedding dimensionality mismatch: clip has {clip}, reference has {reference}")]
    DimensionMismatch { clip: usize, reference: usize },

    /// A distance matrix does not line up with the reference timestamps.
    #[error("distance matrix has {columns} columns but the reference has {timestamps} timestamps")]
    ShapeMismatch { columns: usize, timestamps: usize },

    /// One side of the comparison has no frames.
    #[error("nothing to align: {0} has no frames")]
    Empty(&'static str),
}

/// Align a clip against a reference track.
///
/// Both sequences must share a dimensionality. The result is a pure function
/// of the two inputs: aligning the same pair twice yields identical results.
pub fn align(
    clip: &EmbeddingSequence,
    reference: &EmbeddingSequence,
) -> Result<AlignmentResult, AlignmentError> {
    if clip.dim() != reference.dim() {
        return Err(AlignmentError::DimensionMismatch {
            clip: clip.dim(),
            reference: reference.dim(),
        });
    }

    let distances = distance_matrix(clip.vectors(), reference.vectors());
    align_distances(distances.view(), reference.timestamps())
}

/// Run the voting steps on a precomputed `(clip_frames, reference_frames)`
/// distance matrix.
pub fn align_distances(
    distances: ArrayView2<'_, f32>,
    reference_timestamps: &[f64],
) -> Result<AlignmentResult, AlignmentError> {
    if distances.nrows() == 0 {
        return Err(AlignmentError::Empty("clip"));
    }
    if distances.ncols() == 0 || reference_timestamps.is_empty() {
        return Err(AlignmentError::Empty("reference"));
    }
    if distances.ncols() != reference_timestamps.len() {
        return Err(AlignmentError::ShapeMismatch {
            columns: distances.ncols(),
            timestamps: reference_timestamps.len(),
        });
    }

    let nearest = nearest_frames(distances);
    let votes = vote_histogram(&nearest, distances.ncols());
    let frame_index = winning_frame(&votes);

    Ok(AlignmentResult {
        offset_secs: reference_timestamps[frame_index],
        frame_index,
        votes,
        clip_frames: distances.nrows(),
    })
}

/// Euclidean distance between every clip frame (rows) and every reference
/// frame (columns).
pub fn distance_matrix(clip: ArrayView2<'_, f32>, reference: ArrayView2<'_, f32>) -> Array2<f32> {
    Array2::from_shape_fn((clip.nrows(), reference.nrows()), |(i, j)| {
        euclidean(clip.row(i), reference.row(j))
    })
}

fn euclidean(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Index of the closest reference frame for each clip frame. The first
/// column wins when a row holds several equal minima.
pub fn nearest_frames(distances: ArrayView2<'_, f32>) -> Vec<usize> {
    distances
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_distance = f32::INFINITY;
            for (j, &d) in row.iter().enumerate() {
                if d < best_distance {
                    best = j;
                    best_distance = d;
                }
            }
            best
        })
        .collect()
}

/// Count how many clip frames chose each reference frame.
pub fn vote_histogram(nearest: &[usize], reference_frames: usize) -> Vec<u32> {
    let mut votes = vec![0u32; reference_frames];
    for &index in nearest {
        if let Some(count) = votes.get_mut(index) {
            *count += 1;
        }
    }
    votes
}

/// Index with the highest vote count, the lowest index among ties.
fn winning_frame(votes: &[u32]) -> usize {
    let mut best = 0;
    for (i, &v) in votes.iter().enumerate() {
        if v > votes[best] {
            best = i;
        }
    }
    best
}
