//! Blob codec: blob + timestamp <-> engine document.
//!
//! Payloads are stored as a base64 string, zlib-compressed first unless
//! compression is disabled. The encoding used is written next to the payload
//! so documents stay readable after the setting changes; documents without an
//! `encoding` field are read as zlib.

mod template;

pub use self::template::{DATA_FIELD, ENCODING_FIELD, PartitionTemplate, TIMESTAMP_FIELD};

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde_json::{Value, json};

use crate::domain::{Blob, CodecError, Document, NodeId, Timestamp};

/// On-disk representation of the payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    Zlib,
    Raw,
}

impl PayloadEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadEncoding::Zlib => "zlib",
            PayloadEncoding::Raw => "raw",
        }
    }

    fn parse(s: &str) -> Result<Self, CodecError> {
        match s {
            "zlib" => Ok(PayloadEncoding::Zlib),
            "raw" => Ok(PayloadEncoding::Raw),
            other => Err(CodecError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobCodec {
    encoding: PayloadEncoding,
}

impl BlobCodec {
    pub fn new(compress: bool) -> Self {
        let encoding = if compress {
            PayloadEncoding::Zlib
        } else {
            PayloadEncoding::Raw
        };
        Self { encoding }
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    pub fn encode(
        &self,
        id: &NodeId,
        blob: &[u8],
        timestamp: Timestamp,
    ) -> Result<Document, CodecError> {
        let bytes = match self.encoding {
            PayloadEncoding::Zlib => {
                let mut encoder = ZlibEncoder::new(
                    Vec::with_capacity(blob.len() / 2),
                    Compression::default(),
                );
                encoder.write_all(blob)?;
                encoder.finish()?
            }
            PayloadEncoding::Raw => blob.to_vec(),
        };

        let source = json!({
            DATA_FIELD: BASE64.encode(bytes),
            TIMESTAMP_FIELD: timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ENCODING_FIELD: self.encoding.as_str(),
        });
        Ok(Document::new(id.clone(), source))
    }

    /// Both `data` and `timestamp` are required; a document missing either is
    /// corrupt.
    pub fn decode(&self, document: &Document) -> Result<(Blob, Timestamp), CodecError> {
        let data = stored_str(document, DATA_FIELD)?
            .ok_or(CodecError::MissingField(DATA_FIELD))?;
        let raw_ts = stored_str(document, TIMESTAMP_FIELD)?
            .ok_or(CodecError::MissingField(TIMESTAMP_FIELD))?;
        let encoding = match stored_str(document, ENCODING_FIELD)? {
            Some(s) => PayloadEncoding::parse(s)?,
            None => PayloadEncoding::Zlib,
        };

        let timestamp = DateTime::parse_from_rfc3339(raw_ts)
            .map_err(|_| CodecError::InvalidTimestamp(raw_ts.to_string()))?
            .with_timezone(&Utc);

        let bytes = BASE64.decode(data)?;
        let blob = match encoding {
            PayloadEncoding::Zlib => {
                let mut out = Vec::with_capacity(bytes.len() * 2);
                ZlibDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
                out
            }
            PayloadEncoding::Raw => bytes,
        };
        Ok((blob, timestamp))
    }
}

impl Default for BlobCodec {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Stored fields come back either as plain values or, from a stored-fields
/// lookup, as single-element arrays.
fn stored_str<'a>(
    document: &'a Document,
    field: &'static str,
) -> Result<Option<&'a str>, CodecError> {
    let value = match document.field(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(values)) => match values.as_slice() {
            [] => return Ok(None),
            [single] => single,
            _ => {
                return Err(CodecError::InvalidField {
                    field,
                    reason: format!("expected one value, got {}", values.len()),
                });
            }
        },
        Some(value) => value,
    };
    value.as_str().map(Some).ok_or_else(|| CodecError::InvalidField {
        field,
        reason: format!("expected a string, got {value}"),
    })
}
