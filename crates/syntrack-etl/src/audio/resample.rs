//! Band-limited sample rate conversion backed by rubato.

use rubato::{FftFixedIn, Resampler};
use std::path::Path;

use crate::error::DecodeError;

/// Input frames handed to the resampler per call.
const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

fn resample_error(path: &Path, message: impl ToString) -> DecodeError {
    DecodeError::Resample {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Number of output frames that `input_len` frames map to.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn output_len(input_len: usize, from_rate: u32, to_rate: u32) -> usize {
    (input_len as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize
}

/// Resample mono `samples` from `from_rate` to `to_rate` Hz.
///
/// The result is aligned with the input (the filter delay is dropped) and
/// holds exactly [`output_len`] frames. `path` only labels errors.
pub fn resample(
    path: &Path,
    samples: &[f32],
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(resample_error(
            path,
            format!("invalid sample rate conversion {from_rate} Hz -> {to_rate} Hz"),
        ));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| resample_error(path, e))?;

    let delay = resampler.output_delay();
    let wanted = output_len(samples.len(), from_rate, to_rate);
    let mut out = Vec::with_capacity(delay + wanted + CHUNK_SIZE);
    let mut chunk = vec![0.0f32; resampler.input_frames_next()];
    let mut pos = 0;

    // Past the end of the input the resampler is fed silence until the
    // delayed tail has come out.
    while out.len() < delay + wanted {
        chunk.resize(resampler.input_frames_next(), 0.0);
        let take = chunk.len().min(samples.len().saturating_sub(pos));
        chunk[..take].copy_from_slice(&samples[pos..pos + take]);
        chunk[take..].fill(0.0);
        pos += take;

        let frames = resampler
            .process(&[chunk.as_slice()], None)
            .map_err(|e| resample_error(path, e))?;
        match frames.first() {
            Some(channel) if !channel.is_empty() => out.extend_from_slice(channel),
            _ => return Err(resample_error(path, "resampler produced no output")),
        }
    }

    out.drain(..delay);
    out.truncate(wanted);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn path() -> &'static Path {
        Path::new("clip01.mp4")
    }

    #[allow(clippy::cast_precision_loss)]
    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(resample(path(), &samples, 44100, 44100).unwrap(), samples);
    }

    #[test]
    fn test_output_length_follows_rate_ratio() {
        assert_eq!(resample(path(), &vec![0.0; 4800], 96000, 48000).unwrap().len(), 2400);
        assert_eq!(resample(path(), &vec![0.0; 441], 44100, 48000).unwrap().len(), 480);
        assert_eq!(resample(path(), &vec![0.0; 3], 8000, 16000).unwrap().len(), 6);
        assert_eq!(output_len(1, 44100, 48000), 2);
    }

    #[test]
    fn test_sine_keeps_amplitude_and_frequency() {
        // 1 kHz tone, one second at CD rate.
        let input = sine(1000.0, 44100, 44100);
        let output = resample(path(), &input, 44100, 48000).unwrap();
        assert_eq!(output.len(), 48000);

        let middle = &output[12000..36000];
        let level = rms(middle);
        assert!((level - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02, "rms {level}");

        // Half a second of a 1 kHz tone crosses zero a thousand times.
        let crossings = middle
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        assert!((998..=1002).contains(&crossings), "{crossings} zero crossings");
    }

    #[test]
    fn test_downsampling_rejects_content_above_nyquist() {
        // 20 kHz cannot be represented at 16 kHz and must not alias back in.
        let input = sine(20000.0, 48000, 48000);
        let output = resample(path(), &input, 48000, 16000).unwrap();
        let level = rms(&output[4000..12000]);
        assert!(level < 0.05, "aliased rms {level}");
    }

    #[test]
    fn test_zero_rate_is_an_error() {
        let result = resample(path(), &[0.5; 10], 0, 48000);
        assert!(matches!(result, Err(DecodeError::Resample { .. })), "{result:?}");
    }
}
