//! Text decoding with a fixed encoding fallback list.
//!
//! Exports arrive in whatever encoding the upstream tooling felt like that
//! week. Decoding tries UTF-8, UTF-16 (BOM required), Latin-1, and
//! Windows-1252 in that order and takes the first strict success. Each
//! attempt must decode cleanly: Latin-1 output containing C1 control
//! characters is rejected as a misdetection, since a tab-separated export
//! never legitimately contains them. Only when every attempt fails does the
//! file's import abort with [`PipelineError::Decode`].

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};
use std::path::Path;
use tracing::debug;

use crate::error::PipelineError;

pub const ENCODING_ORDER: [&str; 4] = ["utf-8", "utf-16", "latin-1", "windows-1252"];

#[derive(Debug)]
pub struct DecodedFile {
    pub text: String,
    pub encoding: &'static str,
}

pub fn decode_file(path: &Path) -> Result<DecodedFile, PipelineError> {
    let bytes = std::fs::read(path)?;
    decode_bytes(&bytes).ok_or_else(|| PipelineError::Decode {
        path: path.to_path_buf(),
        tried: ENCODING_ORDER.join(", "),
    })
}

pub fn decode_bytes(bytes: &[u8]) -> Option<DecodedFile> {
    let attempts: [(&'static str, fn(&[u8]) -> Option<String>); 4] = [
        ("utf-8", decode_utf8),
        ("utf-16", decode_utf16),
        ("latin-1", decode_latin1),
        ("windows-1252", decode_windows_1252),
    ];

    for (encoding, attempt) in attempts {
        if let Some(text) = attempt(bytes) {
            debug!(encoding, "decoded input file");
            return Some(DecodedFile { text, encoding });
        }
        debug!(encoding, "decode attempt failed");
    }

    None
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    std::str::from_utf8(body).ok().map(|s| s.to_string())
}

/// UTF-16 is only accepted with a byte-order mark; without one there is no
/// reliable way to tell it apart from a single-byte encoding.
fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 2 {
        return None;
    }
    let (encoding, body) = match (bytes[0], bytes[1]) {
        (0xFF, 0xFE) => (UTF_16LE, &bytes[2..]),
        (0xFE, 0xFF) => (UTF_16BE, &bytes[2..]),
        _ => return None,
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|cow| cow.into_owned())
}

/// ISO-8859-1 maps every byte to the same code point, so on its own it can
/// never fail. Bytes in the C1 control range are treated as evidence of a
/// different single-byte encoding and rejected.
fn decode_latin1(bytes: &[u8]) -> Option<String> {
    if bytes.iter().any(|&b| (0x80..=0x9F).contains(&b)) {
        return None;
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    WINDOWS_1252
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|cow| cow.into_owned())
}
