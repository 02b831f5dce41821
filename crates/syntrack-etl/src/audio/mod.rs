pub mod decoder;
pub mod levels;
pub mod resample;
pub mod wav;

pub use decoder::{decode_audio, DecodedAudio, MediaDecoder, SymphoniaDecoder};
pub use levels::{peak, peak_normalize};
pub use resample::resample;
pub use wav::{read_wav, wav_artifact_path, write_wav_atomic};
