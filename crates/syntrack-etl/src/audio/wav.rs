//! Decoded-audio artifacts: mono 32-bit float WAV files.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::decoder::{downmix_into, DecodedAudio};
use super::resample::resample;
use crate::error::DecodeError;

fn wav_error(path: &Path, message: impl ToString) -> DecodeError {
    DecodeError::Wav {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Path of the decoded-audio artifact for a clip stem inside `wav_dir`.
#[must_use]
pub fn wav_artifact_path(wav_dir: &Path, stem: &str) -> PathBuf {
    wav_dir.join(format!("{stem}.wav"))
}

/// Write `audio` to `path` as a mono float WAV.
///
/// The file is written next to its destination under a temporary name and
/// renamed into place, so readers never see a half-written artifact.
pub fn write_wav_atomic(path: &Path, audio: &DecodedAudio) -> Result<(), DecodeError> {
    let parent = path
        .parent()
        .ok_or_else(|| wav_error(path, "artifact path has no parent directory"))?;
    std::fs::create_dir_all(parent).map_err(|e| wav_error(path, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| wav_error(path, e))?;

    let spec = WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    {
        let mut writer =
            WavWriter::new(BufWriter::new(tmp.as_file_mut()), spec).map_err(|e| wav_error(path, e))?;
        for &sample in &audio.samples {
            writer.write_sample(sample).map_err(|e| wav_error(path, e))?;
        }
        writer.finalize().map_err(|e| wav_error(path, e))?;
    }

    tmp.persist(path).map_err(|e| wav_error(path, e.error))?;
    log::debug!("Wrote {} ({:.1}s)", path.display(), audio.duration_secs);
    Ok(())
}

/// Read a WAV artifact back as mono samples at `target_sample_rate`.
#[allow(clippy::cast_precision_loss)]
pub fn read_wav(path: &Path, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
    let mut reader = WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| wav_error(path, e))?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| wav_error(path, e))?
        }
    };

    let mut mono = Vec::with_capacity(interleaved.len() / usize::from(spec.channels.max(1)));
    downmix_into(&interleaved, usize::from(spec.channels), &mut mono);

    let samples = resample(path, &mono, spec.sample_rate, target_sample_rate)?;
    Ok(DecodedAudio::new(samples, target_sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_preserves_samples() {
        let temp_dir = TempDir::new().unwrap();
        let path = wav_artifact_path(&temp_dir.path().join("wavs"), "clip01");
        let audio = DecodedAudio::new(vec![0.0, 0.25, -0.5, 1.0, 0.125], 16000);

        write_wav_atomic(&path, &audio).unwrap();
        let read = read_wav(&path, 16000).unwrap();

        assert_eq!(read, audio);
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip02.wav");
        write_wav_atomic(&path, &DecodedAudio::new(vec![0.1; 100], 8000)).unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("clip02.wav")]);
    }

    #[test]
    fn test_read_int_wav_scales_to_unit_range() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16384i16).unwrap();
        writer.write_sample(-32768i16).unwrap();
        writer.finalize().unwrap();

        let read = read_wav(&path, 8000).unwrap();
        assert_eq!(read.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_read_at_other_rate_resamples() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clip03.wav");
        write_wav_atomic(&path, &DecodedAudio::new(vec![0.25; 1600], 8000)).unwrap();

        let read = read_wav(&path, 16000).unwrap();
        assert_eq!(read.sample_rate, 16000);
        assert_eq!(read.samples.len(), 3200);
        assert!((read.samples[1600] - 0.25).abs() < 1e-2, "{}", read.samples[1600]);
    }

    #[test]
    fn test_read_missing_wav() {
        let result = read_wav(Path::new("/nonexistent/clip01.wav"), 8000);
        assert!(matches!(result, Err(DecodeError::Wav { .. })));
    }
}
