//! On-disk agent models.
//!
//! Layout: `A2M1` magic, version byte, kind-name length byte, kind name (UTF-8),
//! postcard payload, then a CRC32C of everything before it.
//!
//! Saves go through a sibling `.tmp` file that is synced and renamed over the
//! target, and is removed again on any failure. A model that was not completely
//! written is never found under the real name, and a damaged one fails the checksum.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

const MAGIC: &[u8; 4] = b"A2M1";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 1;
const CHECKSUM_LEN: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("checksum mismatch")]
    Checksum,
    #[error("file too short or malformed")]
    Malformed,
    #[error("network record error: {0}")]
    Record(String),
    #[error("agent kind name `{0}` is too long")]
    KindTooLong(String),
    #[error("model holds a `{found}` agent, expected `{expected}`")]
    KindMismatch { expected: String, found: String },
}

pub fn encode_model<T: Serialize>(kind: &str, model: &T) -> Result<Vec<u8>, ModelError> {
    let kind_len: u8 = kind
        .len()
        .try_into()
        .map_err(|_| ModelError::KindTooLong(kind.to_string()))?;
    let payload = postcard::to_allocvec(model)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + kind.len() + payload.len() + CHECKSUM_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION);
    buf.push(kind_len);
    buf.extend_from_slice(kind.as_bytes());
    buf.extend_from_slice(&payload);

    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

/// Verify the envelope and return the stored kind name and the payload bytes.
fn open_envelope(bytes: &[u8]) -> Result<(&str, &[u8]), ModelError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(ModelError::Malformed);
    }
    let (content, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if stored != crc32c::crc32c(content) {
        return Err(ModelError::Checksum);
    }

    if &content[..4] != MAGIC || content[4] != VERSION {
        return Err(ModelError::MagicOrVersion);
    }
    let kind_len = content[5] as usize;
    let kind_end = HEADER_LEN + kind_len;
    if content.len() < kind_end {
        return Err(ModelError::Malformed);
    }
    let kind = std::str::from_utf8(&content[HEADER_LEN..kind_end]).map_err(|_| ModelError::Malformed)?;
    Ok((kind, &content[kind_end..]))
}

pub fn decode_model<T: DeserializeOwned>(bytes: &[u8], kind: &str) -> Result<T, ModelError> {
    let (found, payload) = open_envelope(bytes)?;
    if found != kind {
        return Err(ModelError::KindMismatch { expected: kind.to_string(), found: found.to_string() });
    }
    Ok(postcard::from_bytes(payload)?)
}

/// Kind name recorded in a model file.
pub fn stored_kind<P: AsRef<Path>>(path: P) -> Result<String, ModelError> {
    let bytes = fs::read(path)?;
    let (kind, _) = open_envelope(&bytes)?;
    Ok(kind.to_string())
}

pub fn save_model<T: Serialize, P: AsRef<Path>>(path: P, kind: &str, model: &T) -> Result<(), ModelError> {
    let path = path.as_ref();
    let bytes = encode_model(kind, model)?;
    let tmp = temp_path(path);
    let written = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = written {
        debug!(tmp = %tmp.display(), "removing partial model after failed save");
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    info!(path = %path.display(), kind, bytes = bytes.len(), "model saved");
    Ok(())
}

pub fn load_model<T: DeserializeOwned, P: AsRef<Path>>(path: P, kind: &str) -> Result<T, ModelError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let model = decode_model(&bytes, kind)?;
    info!(path = %path.display(), kind, "model loaded");
    Ok(model)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::{tempdir, NamedTempFile};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        layers: Vec<Vec<f32>>,
        steps: u64,
    }

    fn sample() -> Weights {
        Weights { layers: vec![vec![0.5, -1.25], vec![3.0]], steps: 42 }
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.a2m");
        save_model(&path, "qnet", &sample()).unwrap();
        assert!(!dir.path().join("agent.a2m.tmp").exists());
        let loaded: Weights = load_model(&path, "qnet").unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(stored_kind(&path).unwrap(), "qnet");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_model::<Weights, _>(dir.path().join("nope.a2m"), "qnet").unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = encode_model("qnet", &sample()).unwrap();
        let idx = HEADER_LEN + 4 + 1;
        bytes[idx] ^= 0xFF;
        let err = decode_model::<Weights>(&bytes, "qnet").unwrap_err();
        assert!(matches!(err, ModelError::Checksum));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut bytes = encode_model("qnet", &sample()).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(tmp.path(), &bytes).unwrap();
        assert!(load_model::<Weights, _>(tmp.path(), "qnet").is_err());

        let err = decode_model::<Weights>(&bytes[..5], "qnet").unwrap_err();
        assert!(matches!(err, ModelError::Malformed));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let bytes = encode_model("random", &7u64).unwrap();
        let err = decode_model::<u64>(&bytes, "qnet").unwrap_err();
        assert!(matches!(err, ModelError::KindMismatch { .. }));
    }

    #[test]
    fn failed_save_leaves_no_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("agent.a2m");
        let err = save_model(&path, "qnet", &sample()).unwrap_err();
        assert!(matches!(err, ModelError::Io(_)));
        assert!(!path.exists());
    }
}
