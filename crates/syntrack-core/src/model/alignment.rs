use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a clip best matches its reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Reference timestamp of the winning frame, in seconds.
    pub offset_secs: f64,

    /// Index of the winning reference frame.
    pub frame_index: usize,

    /// Vote count per reference frame index.
    pub votes: Vec<u32>,

    /// Number of clip frames that voted.
    pub clip_frames: usize,
}

impl AlignmentResult {
    /// Votes received by the winning frame.
    #[must_use]
    pub fn winning_votes(&self) -> u32 {
        self.votes.get(self.frame_index).copied().unwrap_or(0)
    }

    /// Share of clip frames that voted for the winning frame, in `0.0..=1.0`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        if self.clip_frames == 0 {
            return 0.0;
        }
        f64::from(self.winning_votes()) / self.clip_frames as f64
    }

    /// The `k` reference frames with the most votes as `(index, votes)`,
    /// most votes first, lower index first among equals.
    #[must_use]
    pub fn top_candidates(&self, k: usize) -> Vec<(usize, u32)> {
        let mut ranked: Vec<(usize, u32)> = self
            .votes
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, v)| v > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}

impl fmt::Display for AlignmentResult {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.offset_secs.max(0.0) as u64;
        write!(
            f,
            "{:.1}s ({}:{:02}) frame {} with {}/{} votes",
            self.offset_secs,
            whole / 60,
            whole % 60,
            self.frame_index,
            self.winning_votes(),
            self.clip_frames
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> AlignmentResult {
        AlignmentResult {
            offset_secs: 74.2,
            frame_index: 2,
            votes: vec![1, 3, 3, 0, 2],
            clip_frames: 9,
        }
    }

    #[test]
    fn test_winning_votes_and_confidence() {
        let r = result();
        assert_eq!(r.winning_votes(), 3);
        assert!((r.confidence() - 3.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_top_candidates_order() {
        let r = result();
        assert_eq!(r.top_candidates(3), vec![(1, 3), (2, 3), (4, 2)]);
        assert_eq!(r.top_candidates(10).len(), 4);
    }

    #[test]
    fn test_display() {
        let shown = result().to_string();
        assert!(shown.starts_with("74.2s (1:14)"), "{shown}");
    }
}
