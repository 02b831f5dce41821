use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::resample;
use crate::error::DecodeError;

/// Decoded audio as mono PCM samples at a specific sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

impl DecodedAudio {
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration_secs = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / f64::from(sample_rate)
        };
        Self {
            samples,
            sample_rate,
            duration_secs,
        }
    }
}

/// Turns a media file (audio or video container) into mono PCM.
pub trait MediaDecoder: Send + Sync {
    /// Decode `path` and return mono samples at `sample_rate` Hz.
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<DecodedAudio, DecodeError>;
}

/// [`MediaDecoder`] backed by symphonia.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl MediaDecoder for SymphoniaDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        decode_audio(path, sample_rate)
    }
}

fn format_error(path: &Path, err: &SymphoniaError) -> DecodeError {
    DecodeError::Format {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn codec_error(path: &Path, err: &SymphoniaError) -> DecodeError {
    DecodeError::Codec {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Decode a media file to mono PCM samples.
///
/// Picks the first track with a known codec (a video container's audio
/// track), down-mixes by averaging channels, and resamples to
/// `target_sample_rate`.
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
    let file = std::fs::File::open(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format_error(path, &e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack {
            path: path.to_path_buf(),
        })?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| codec_error(path, &e))?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut buf_frames = 0u64;
    let mut source_rate = codec_params.sample_rate;
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(format_error(path, &e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                let channels = spec.channels.count().max(1);
                source_rate = Some(spec.rate);

                let frames = audio_buf.capacity() as u64;
                if sample_buf.is_none() || frames > buf_frames {
                    sample_buf = Some(SampleBuffer::<f32>::new(frames, spec));
                    buf_frames = frames;
                }

                if let Some(ref mut buf) = sample_buf {
                    buf.copy_interleaved_ref(audio_buf);
                    downmix_into(buf.samples(), channels, &mut mono);
                }
            }
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("Skipping undecodable packet in {}: {}", path.display(), msg);
            }
            Err(e) => return Err(codec_error(path, &e)),
        }
    }

    let source_rate = source_rate.ok_or_else(|| DecodeError::NoAudioTrack {
        path: path.to_path_buf(),
    })?;

    let resampled = resample(path, &mono, source_rate, target_sample_rate)?;
    Ok(DecodedAudio::new(resampled, target_sample_rate))
}

/// Average interleaved channels into mono samples appended to `out`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32),
    );
}
