//! On-disk format for embedding sequences.
//!
//! An artifact is a gzip stream holding, little-endian:
//!
//! ```text
//! magic u32 | version u32 | tag_len u32 | tag bytes | N u32 | D u32 |
//! N*D f32 vectors (row-major) | N f64 timestamps
//! ```
//!
//! The parameter tag is stored inside the file as well as in its name, so a
//! renamed or mismatched file is detected on load.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use syntrack_core::EmbeddingSequence;

use crate::error::CacheError;

const ARTIFACT_MAGIC: u32 = 0x5359_4E45; // "SYNE"
const ARTIFACT_VERSION: u32 = 1;

/// File extension of embedding artifacts.
pub const ARTIFACT_EXTENSION: &str = "emb.gz";

fn corrupt(path: &Path, reason: impl Into<String>) -> CacheError {
    CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Serialize `sequence` tagged with `params_tag`, uncompressed.
fn encode(sequence: &EmbeddingSequence, params_tag: &str) -> Result<Vec<u8>, String> {
    let n = u32::try_from(sequence.len()).map_err(|_| "too many frames".to_string())?;
    let d = u32::try_from(sequence.dim()).map_err(|_| "dimension too large".to_string())?;
    let tag_len = u32::try_from(params_tag.len()).map_err(|_| "tag too long".to_string())?;

    let mut buf = Vec::with_capacity(24 + params_tag.len() + sequence.len() * (sequence.dim() * 4 + 8));
    buf.extend_from_slice(&ARTIFACT_MAGIC.to_le_bytes());
    buf.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
    buf.extend_from_slice(&tag_len.to_le_bytes());
    buf.extend_from_slice(params_tag.as_bytes());
    buf.extend_from_slice(&n.to_le_bytes());
    buf.extend_from_slice(&d.to_le_bytes());
    for v in sequence.vectors() {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    for t in sequence.timestamps() {
        buf.extend_from_slice(&t.to_le_bytes());
    }
    Ok(buf)
}

/// Cursor over a decompressed artifact that reports truncation.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.bytes.len() < len {
            return None;
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Some(head)
    }

    fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn decode(bytes: &[u8], expected_tag: &str, path: &Path) -> Result<EmbeddingSequence, CacheError> {
    let mut r = Reader { bytes };
    let truncated = || corrupt(path, "truncated");

    let magic = r.u32().ok_or_else(truncated)?;
    if magic != ARTIFACT_MAGIC {
        return Err(corrupt(
            path,
            format!("bad magic: expected {ARTIFACT_MAGIC:#x}, got {magic:#x}"),
        ));
    }
    let version = r.u32().ok_or_else(truncated)?;
    if version != ARTIFACT_VERSION {
        return Err(corrupt(path, format!("unsupported version {version}")));
    }

    let tag_len = r.u32().ok_or_else(truncated)? as usize;
    let tag = r.take(tag_len).ok_or_else(truncated)?;
    if tag != expected_tag.as_bytes() {
        return Err(corrupt(
            path,
            format!(
                "parameter tag {:?}, expected {expected_tag:?}",
                String::from_utf8_lossy(tag)
            ),
        ));
    }

    let n = r.u32().ok_or_else(truncated)? as usize;
    let d = r.u32().ok_or_else(truncated)? as usize;
    let vector_bytes = n
        .checked_mul(d)
        .and_then(|c| c.checked_mul(4))
        .ok_or_else(|| corrupt(path, "shape overflows"))?;

    let data = r
        .take(vector_bytes)
        .ok_or_else(truncated)?
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let timestamps = r
        .take(n * 8)
        .ok_or_else(truncated)?
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();
    if !r.bytes.is_empty() {
        return Err(corrupt(path, format!("{} trailing bytes", r.bytes.len())));
    }

    EmbeddingSequence::from_flat(data, d, timestamps).map_err(|e| corrupt(path, e.to_string()))
}

/// Write an artifact atomically: temp file in the destination directory,
/// then rename.
pub fn write_artifact(
    path: &Path,
    sequence: &EmbeddingSequence,
    params_tag: &str,
) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| corrupt(path, "artifact path has no parent directory"))?;
    std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

    let bytes = encode(sequence, params_tag).map_err(|reason| corrupt(path, reason))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| CacheError::io(parent, e))?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(tmp.as_file_mut()), Compression::fast());
        encoder.write_all(&bytes).map_err(|e| CacheError::io(path, e))?;
        encoder
            .finish()
            .and_then(|mut w| w.flush())
            .map_err(|e| CacheError::io(path, e))?;
    }
    tmp.persist(path)
        .map_err(|e| CacheError::io(path, e.error))?;

    log::debug!(
        "Stored {} ({} frames x {} dims)",
        path.display(),
        sequence.len(),
        sequence.dim()
    );
    Ok(())
}

/// Read an artifact, checking that it was produced with `expected_tag`.
///
/// A file that cannot be opened is [`CacheError::Io`]; one that opens but
/// does not hold a valid sequence is [`CacheError::Corrupt`].
pub fn read_artifact(path: &Path, expected_tag: &str) -> Result<EmbeddingSequence, CacheError> {
    let file = std::fs::File::open(path).map_err(|e| CacheError::io(path, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .map_err(|e| corrupt(path, format!("gzip: {e}")))?;
    decode(&bytes, expected_tag, path)
}
