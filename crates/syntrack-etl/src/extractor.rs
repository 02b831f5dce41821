//! Embedding extraction.
//!
//! The embedding model sits behind [`EmbeddingExtractor`] so the pipeline
//! never depends on a particular network. [`EnvelopeExtractor`] is the
//! built-in deterministic model; anything heavier is injected by
//! implementing the trait.

use ndarray::Array2;
use syntrack_core::{EmbeddingSequence, ExtractionParameters};

use crate::audio::levels;
use crate::error::ExtractionError;

/// Maps mono PCM at `params.sample_rate` to an embedding sequence.
///
/// Implementations must be deterministic for fixed input and parameters,
/// emit frames on the `params.hop_secs` grid, and produce vectors of
/// `params.embedding_size` values.
pub trait EmbeddingExtractor: Send + Sync {
    /// Model name; must equal `ExtractionParameters::model`.
    fn model(&self) -> &str;

    fn extract(
        &self,
        pcm: &[f32],
        params: &ExtractionParameters,
    ) -> Result<EmbeddingSequence, ExtractionError>;
}

/// Run `extractor` with input and output validation.
///
/// Rejects empty input, input shorter than one hop, and silent input before
/// the model sees it, then checks the output dimensionality.
pub fn extract_checked(
    extractor: &dyn EmbeddingExtractor,
    pcm: &[f32],
    params: &ExtractionParameters,
) -> Result<EmbeddingSequence, ExtractionError> {
    if extractor.model() != params.model {
        return Err(ExtractionError::ModelMismatch {
            expected: params.model.clone(),
            actual: extractor.model().to_string(),
        });
    }
    if pcm.is_empty() {
        return Err(ExtractionError::EmptyInput);
    }
    let needed = params.hop_samples();
    if pcm.len() < needed {
        return Err(ExtractionError::TooShort {
            samples: pcm.len(),
            needed,
        });
    }
    let peak = levels::peak(pcm);
    if peak <= levels::SILENCE_PEAK {
        return Err(ExtractionError::Silent { peak });
    }

    let sequence = extractor.extract(pcm, params)?;
    if sequence.dim() != params.embedding_size {
        return Err(ExtractionError::InvalidOutput(format!(
            "{}-dimensional vectors, expected {}",
            sequence.dim(),
            params.embedding_size
        )));
    }
    Ok(sequence)
}

/// Deterministic loudness-envelope embedding.
///
/// Frame `k` is centred at `k * hop_secs` and looks at one second of audio
/// (zero-padded at the edges). The window is cut into `embedding_size`
/// slots; each slot contributes its log RMS, and the vector is z-normalised
/// so only the shape of the envelope matters, not the overall gain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeExtractor;

impl EnvelopeExtractor {
    pub const MODEL: &'static str = "envelope";
}

impl EmbeddingExtractor for EnvelopeExtractor {
    fn model(&self) -> &str {
        Self::MODEL
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    fn extract(
        &self,
        pcm: &[f32],
        params: &ExtractionParameters,
    ) -> Result<EmbeddingSequence, ExtractionError> {
        if pcm.is_empty() {
            return Err(ExtractionError::EmptyInput);
        }
        let hop = params.hop_samples();
        let dim = params.embedding_size;
        let window = params.sample_rate.max(1) as usize;
        let frames = 1 + pcm.len() / hop;

        // Running sum of squares, so each slot costs O(1).
        let mut energy = Vec::with_capacity(pcm.len() + 1);
        energy.push(0.0f64);
        let mut acc = 0.0f64;
        for &s in pcm {
            acc += f64::from(s) * f64::from(s);
            energy.push(acc);
        }
        let sum_squares = |start: i64, end: i64| -> f64 {
            let a = start.clamp(0, pcm.len() as i64) as usize;
            let b = end.clamp(0, pcm.len() as i64) as usize;
            energy[b] - energy[a]
        };

        let mut vectors = Array2::<f32>::zeros((frames, dim));
        for (k, mut row) in vectors.rows_mut().into_iter().enumerate() {
            let start = (k * hop) as i64 - (window / 2) as i64;
            for (slot, value) in row.iter_mut().enumerate() {
                let a = start + (slot * window / dim) as i64;
                let b = start + ((slot + 1) * window / dim) as i64;
                let len = (b - a).max(1) as f64;
                let rms = (sum_squares(a, b) / len).sqrt();
                *value = (rms + 1e-6).ln() as f32;
            }

            let n = dim as f32;
            let mean = row.sum() / n;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
            let std = var.sqrt();
            if std > 1e-6 {
                row.mapv_inplace(|v| (v - mean) / std);
            } else {
                row.fill(0.0);
            }
        }

        EmbeddingSequence::on_grid(vectors, params.hop_secs)
            .map_err(|e| ExtractionError::InvalidOutput(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ExtractionParameters {
        ExtractionParameters::default()
            .with_sample_rate(1000)
            .with_hop_secs(0.1)
            .with_embedding_size(16)
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 1000.0;
                (t * 40.0).sin() * (0.2 + (t * 0.7).sin().abs())
            })
            .collect()
    }

    struct WrongDim;

    impl EmbeddingExtractor for WrongDim {
        fn model(&self) -> &str {
            "envelope"
        }

        fn extract(
            &self,
            _pcm: &[f32],
            _params: &ExtractionParameters,
        ) -> Result<EmbeddingSequence, ExtractionError> {
            Ok(EmbeddingSequence::from_rows(vec![vec![0.0; 3]], vec![0.0]).unwrap())
        }
    }

    #[test]
    fn test_envelope_frame_grid() {
        let seq = extract_checked(&EnvelopeExtractor, &tone(2500), &params()).unwrap();
        assert_eq!(seq.len(), 26);
        assert_eq!(seq.dim(), 16);
        assert!((seq.timestamps()[25] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_envelope_is_deterministic() {
        let pcm = tone(3000);
        let a = EnvelopeExtractor.extract(&pcm, &params()).unwrap();
        let b = EnvelopeExtractor.extract(&pcm, &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_envelope_ignores_gain() {
        let pcm = tone(3000);
        let loud: Vec<f32> = pcm.iter().map(|s| s * 4.0).collect();
        let a = EnvelopeExtractor.extract(&pcm, &params()).unwrap();
        let b = EnvelopeExtractor.extract(&loud, &params()).unwrap();
        // Frames whose window lies fully inside the audio.
        let max_diff = (5..=25)
            .flat_map(|k| {
                a.frame(k)
                    .iter()
                    .zip(b.frame(k).iter())
                    .map(|(x, y)| (x - y).abs())
                    .collect::<Vec<_>>()
            })
            .fold(0.0f32, f32::max);
        assert!(max_diff < 0.05, "max diff {max_diff}");
    }

    #[test]
    fn test_rejects_empty_input() {
        let result = extract_checked(&EnvelopeExtractor, &[], &params());
        assert!(matches!(result, Err(ExtractionError::EmptyInput)));
    }

    #[test]
    fn test_rejects_input_shorter_than_hop() {
        let result = extract_checked(&EnvelopeExtractor, &tone(50), &params());
        assert!(matches!(
            result,
            Err(ExtractionError::TooShort {
                samples: 50,
                needed: 100
            })
        ));
    }

    #[test]
    fn test_rejects_silence() {
        let result = extract_checked(&EnvelopeExtractor, &[0.0; 5000], &params());
        assert!(matches!(result, Err(ExtractionError::Silent { .. })));
    }

    #[test]
    fn test_rejects_other_model() {
        let result = extract_checked(
            &EnvelopeExtractor,
            &tone(2000),
            &params().with_model("openl3"),
        );
        assert!(matches!(result, Err(ExtractionError::ModelMismatch { .. })));
    }

    #[test]
    fn test_rejects_wrong_output_dimension() {
        let result = extract_checked(&WrongDim, &tone(2000), &params());
        assert!(matches!(result, Err(ExtractionError::InvalidOutput(_))));
    }
}
