//! Versioned binary envelope for stored models.
//!
//! A blob is the bincode encoding of
//! `{ magic: b"SYND", version, kind, payload }` where `payload` is the
//! bincode encoding of the model's stored form. The same bincode options
//! are used for both layers.

use std::fs;
use std::path::Path;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SynthError, SynthResult};

pub const MAGIC: [u8; 4] = *b"SYND";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    version: u32,
    kind: String,
    payload: Vec<u8>,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Wrap the encoded `stored` value in an envelope tagged with `kind`.
pub fn encode<T: Serialize>(kind: &str, stored: &T) -> SynthResult<Vec<u8>> {
    let payload = codec().serialize(stored)?;
    let envelope = Envelope {
        magic: MAGIC,
        version: FORMAT_VERSION,
        kind: kind.to_string(),
        payload,
    };
    Ok(codec().serialize(&envelope)?)
}

fn open(bytes: &[u8]) -> SynthResult<Envelope> {
    let envelope: Envelope = codec()
        .with_limit(bytes.len() as u64)
        .deserialize(bytes)
        .map_err(|err| SynthError::Format(format!("not a model blob ({err})")))?;
    if envelope.magic != MAGIC {
        return Err(SynthError::Format("bad magic bytes".into()));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(SynthError::Format(format!(
            "unsupported format version {}, expected {FORMAT_VERSION}",
            envelope.version
        )));
    }
    Ok(envelope)
}

/// Model kind recorded in a blob, without decoding the payload.
pub fn peek_kind(bytes: &[u8]) -> SynthResult<String> {
    Ok(open(bytes)?.kind)
}

/// Unwrap a blob and decode its payload.
///
/// Fails with [`SynthError::TypeMismatch`] if the blob was written for a
/// model kind other than `expected`.
pub fn decode<T: DeserializeOwned>(expected: &str, bytes: &[u8]) -> SynthResult<T> {
    let envelope = open(bytes)?;
    if envelope.kind != expected {
        return Err(SynthError::TypeMismatch {
            expected: expected.to_string(),
            found: envelope.kind,
        });
    }
    let payload = &envelope.payload;
    Ok(codec().with_limit(payload.len() as u64).deserialize(payload)?)
}

pub fn write_file(path: &Path, bytes: &[u8]) -> SynthResult<()> {
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_file(path: &Path) -> SynthResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        weights: Vec<f64>,
    }

    fn payload() -> Payload {
        Payload {
            name: "chain".to_string(),
            weights: vec![0.25, 0.75],
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode("toy", &payload()).unwrap();
        assert_eq!(peek_kind(&bytes).unwrap(), "toy");
        let back: Payload = decode("toy", &bytes).unwrap();
        assert_eq!(back, payload());
    }

    #[test]
    fn test_kind_mismatch() {
        let bytes = encode("toy", &payload()).unwrap();
        match decode::<Payload>("markov", &bytes) {
            Err(SynthError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "markov");
                assert_eq!(found, "toy");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_garbage_is_format_error() {
        assert!(matches!(peek_kind(b"definitely not a model"), Err(SynthError::Format(_))));
        assert!(matches!(peek_kind(&[]), Err(SynthError::Format(_))));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let envelope = Envelope {
            magic: MAGIC,
            version: FORMAT_VERSION + 1,
            kind: "toy".to_string(),
            payload: Vec::new(),
        };
        let bytes = codec().serialize(&envelope).unwrap();
        match peek_kind(&bytes) {
            Err(SynthError::Format(msg)) => assert!(msg.contains("version")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated_blob() {
        let bytes = encode("toy", &payload()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(decode::<Payload>("toy", cut).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let bytes = encode("toy", &payload()).unwrap();
        write_file(&path, &bytes).unwrap();
        assert_eq!(read_file(&path).unwrap(), bytes);
        assert!(matches!(read_file(&dir.path().join("missing.bin")), Err(SynthError::Io(_))));
    }
}
