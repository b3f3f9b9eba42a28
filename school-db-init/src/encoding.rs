//! Schema file encoding normalization
//!
//! Schema dumps exported on Windows tools often arrive as UTF-16. The mysql
//! client wants UTF-8, so every file is transcoded before import.

use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16_LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16_BE: &[u8] = &[0xFE, 0xFF];

/// Encoding a schema file was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16Le => "UTF-16LE",
            Self::Utf16Be => "UTF-16BE",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{encoding} input has odd length {len}")]
    OddLength { encoding: SourceEncoding, len: usize },

    #[error("{encoding} input has an unpaired surrogate 0x{unit:04X}")]
    UnpairedSurrogate { encoding: SourceEncoding, unit: u16 },

    #[error("UTF-8 input is invalid at byte {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("input is neither UTF-8 nor UTF-16 ({le}; {be})")]
    Undecodable {
        le: Box<EncodingError>,
        be: Box<EncodingError>,
    },
}

/// A schema file transcoded to UTF-8.
#[derive(Debug, Clone)]
pub struct NormalizedSql {
    pub path: PathBuf,
    pub source_encoding: SourceEncoding,
    pub text: String,
}

/// Read `path` and transcode it to UTF-8.
pub fn load_sql(path: &Path) -> anyhow::Result<NormalizedSql> {
    let bytes =
        std::fs::read(path).context(format!("Failed to read {}", path.display()))?;
    let (text, source_encoding) =
        normalize_to_utf8(&bytes).map_err(|source| crate::InitError::Encoding {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        path = %path.display(),
        encoding = %source_encoding,
        bytes = bytes.len(),
        "Normalized schema file"
    );

    Ok(NormalizedSql {
        path: path.to_path_buf(),
        source_encoding,
        text,
    })
}

/// Transcode raw file bytes to UTF-8 text without a BOM.
///
/// A BOM decides the encoding outright. Without one, NUL-free valid UTF-8
/// passes through unchanged; anything else is decoded strictly as UTF-16,
/// little-endian first unless the NUL layout says big-endian.
pub fn normalize_to_utf8(bytes: &[u8]) -> Result<(String, SourceEncoding), EncodingError> {
    if let Some(rest) = bytes.strip_prefix(BOM_UTF16_LE) {
        return decode_utf16(rest, SourceEncoding::Utf16Le).map(|t| (t, SourceEncoding::Utf16Le));
    }
    if let Some(rest) = bytes.strip_prefix(BOM_UTF16_BE) {
        return decode_utf16(rest, SourceEncoding::Utf16Be).map(|t| (t, SourceEncoding::Utf16Be));
    }
    if let Some(rest) = bytes.strip_prefix(BOM_UTF8) {
        return std::str::from_utf8(rest)
            .map(|text| (text.to_string(), SourceEncoding::Utf8))
            .map_err(|e| EncodingError::InvalidUtf8 {
                offset: BOM_UTF8.len() + e.valid_up_to(),
            });
    }

    if !bytes.contains(&0) {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok((text.to_string(), SourceEncoding::Utf8));
        }
    }

    let (first, second) = if looks_big_endian(bytes) {
        (SourceEncoding::Utf16Be, SourceEncoding::Utf16Le)
    } else {
        (SourceEncoding::Utf16Le, SourceEncoding::Utf16Be)
    };

    let first_err = match decode_utf16(bytes, first) {
        Ok(text) => return Ok((text, first)),
        Err(e) => e,
    };
    let second_err = match decode_utf16(bytes, second) {
        Ok(text) => return Ok((text, second)),
        Err(e) => e,
    };

    let (le, be) = if first == SourceEncoding::Utf16Le {
        (first_err, second_err)
    } else {
        (second_err, first_err)
    };
    Err(EncodingError::Undecodable {
        le: Box::new(le),
        be: Box::new(be),
    })
}

/// ASCII-heavy UTF-16BE has its zero bytes at even offsets.
fn looks_big_endian(bytes: &[u8]) -> bool {
    let (even, odd) = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == 0)
        .fold((0usize, 0usize), |(even, odd), (i, _)| {
            if i % 2 == 0 {
                (even + 1, odd)
            } else {
                (even, odd + 1)
            }
        });
    even > odd
}

fn decode_utf16(bytes: &[u8], encoding: SourceEncoding) -> Result<String, EncodingError> {
    if bytes.len() % 2 != 0 {
        return Err(EncodingError::OddLength {
            encoding,
            len: bytes.len(),
        });
    }

    let units = bytes.chunks_exact(2).map(|pair| match encoding {
        SourceEncoding::Utf16Be => u16::from_be_bytes([pair[0], pair[1]]),
        _ => u16::from_le_bytes([pair[0], pair[1]]),
    });

    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|e| EncodingError::UnpairedSurrogate {
            encoding,
            unit: e.unpaired_surrogate(),
        })
}
