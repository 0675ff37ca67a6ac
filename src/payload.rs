//! Frame payload demultiplexing.
//!
//! Two payload layouts exist. A deployment picks one; they are never
//! auto-detected or mixed within a stream.
//!
//! - `Untagged`: the payload is the encoded image.
//! - `Tagged`: `[id_len: u8][id_len bytes of UTF-8 source id][encoded image]`.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire layout of a frame payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    /// Single-source layout: payload is the image.
    #[default]
    Untagged,
    /// Multi-source layout: payload starts with a length-prefixed source id.
    Tagged,
}

impl ProtocolVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVariant::Untagged => "untagged",
            ProtocolVariant::Tagged => "tagged",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVariant {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "untagged" | "legacy" | "single-source" => Ok(ProtocolVariant::Untagged),
            "tagged" | "multi-source" => Ok(ProtocolVariant::Tagged),
            other => Err(anyhow!(
                "unknown protocol variant '{}'; expected 'untagged' or 'tagged'",
                other
            )),
        }
    }
}

/// Demultiplexed payload: optional source tag plus the encoded image bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Payload<'a> {
    pub source: Option<String>,
    pub image: &'a [u8],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("tagged payload needs {needed} bytes for its source id header, has {available}")]
    Malformed { needed: usize, available: usize },
    #[error("source id is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

/// Split a payload into its source tag and image bytes.
pub fn demux(payload: &[u8], variant: ProtocolVariant) -> Result<Payload<'_>, PayloadError> {
    match variant {
        ProtocolVariant::Untagged => Ok(Payload {
            source: None,
            image: payload,
        }),
        ProtocolVariant::Tagged => {
            let (&id_len, rest) = payload.split_first().ok_or(PayloadError::Malformed {
                needed: 1,
                available: 0,
            })?;
            let id_len = id_len as usize;
            if rest.len() < id_len {
                return Err(PayloadError::Malformed {
                    needed: 1 + id_len,
                    available: payload.len(),
                });
            }
            let (id, image) = rest.split_at(id_len);
            let source = std::str::from_utf8(id)?.to_string();
            Ok(Payload {
                source: Some(source),
                image,
            })
        }
    }
}

/// Build a tagged payload from a source id and image bytes.
pub fn encode_tagged(source: &str, image: &[u8]) -> Result<Vec<u8>> {
    let id_len = u8::try_from(source.len()).map_err(|_| {
        anyhow!(
            "source id is {} bytes; tagged payloads allow at most {}",
            source.len(),
            u8::MAX
        )
    })?;
    let mut payload = Vec::with_capacity(1 + source.len() + image.len());
    payload.push(id_len);
    payload.extend_from_slice(source.as_bytes());
    payload.extend_from_slice(image);
    Ok(payload)
}
