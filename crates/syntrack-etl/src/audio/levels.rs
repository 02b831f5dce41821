//! Sample-level measurements used before embedding.

/// Peak level below which audio counts as silence.
pub const SILENCE_PEAK: f32 = 1e-4;

/// Largest absolute sample value, `0.0` for empty input.
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Scale samples in place so the peak sits at 1.0.
///
/// Silent input is left untouched.
pub fn peak_normalize(samples: &mut [f32]) {
    let p = peak(samples);
    if p <= SILENCE_PEAK {
        return;
    }
    let gain = 1.0 / p;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak() {
        assert_eq!(peak(&[]), 0.0);
        assert_eq!(peak(&[0.1, -0.7, 0.3]), 0.7);
    }

    #[test]
    fn test_peak_normalize_scales_to_unit_peak() {
        let mut samples = vec![0.25, -0.5, 0.125];
        peak_normalize(&mut samples);
        assert_eq!(samples, vec![0.5, -1.0, 0.25]);
    }

    #[test]
    fn test_peak_normalize_leaves_silence_alone() {
        let mut samples = vec![0.0; 8];
        peak_normalize(&mut samples);
        assert!(samples.iter().all(|s| *s == 0.0));
    }
}
