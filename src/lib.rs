//! Detection worker
//!
//! A co-process that reads length-prefixed encoded frames from a byte pipe,
//! runs object detection on each frame and writes one JSON line per
//! processed frame.
//!
//! # Wire format
//!
//! Input: `[u32 BE length][payload]`, where the payload is either the encoded
//! image (untagged) or `[id_len: u8][source id][encoded image]` (tagged).
//!
//! Output: `{"source":"cam","detections":[{"label":"person","confidence":0.9,"box":[cx,cy,w,h]}]}`
//! followed by a newline, flushed per record. `source` is omitted for
//! untagged input; `detections` is always present.
//!
//! # Module Structure
//!
//! - `wire`: frame reader and writer for the length-prefixed transport
//! - `payload`: tagged/untagged payload demultiplexing
//! - `decode`: encoded image to RGB frame
//! - `detect`: detector backends and result types
//! - `output`: JSON-lines result writer
//! - `worker`: the detection loop
//! - `config`: file, environment and CLI configuration

pub mod config;
pub mod decode;
pub mod detect;
pub mod output;
pub mod payload;
pub mod wire;
pub mod worker;

pub use config::{ConfigOverrides, DetectorSettings, WorkerConfig};
pub use decode::{DecodedImage, FrameDecoder, ImageDecoder};
pub use detect::{
    load_backend, BackendKind, ClassFilter, Detection, DetectionResult, DetectorBackend,
    RawDetection, StubBackend,
};
pub use output::ResultWriter;
pub use payload::{demux, encode_tagged, Payload, PayloadError, ProtocolVariant};
pub use wire::{write_frame, FrameReader, ReadOutcome};
pub use worker::{DetectionLoop, FrameError, LoopState, LoopStats, MIN_CONFIDENCE, WATCHED_CLASSES};
