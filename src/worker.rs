//! Detection loop: the long-lived orchestrator.
//!
//! Each iteration reads one frame, demultiplexes it, decodes the image, runs
//! the detector with the fixed class filter, applies the confidence gate and
//! writes exactly one result line. Iterations are strictly sequential.
//!
//! Per-frame failures are typed (`FrameError`) and matched here. Every one of
//! them is logged and the frame skipped; the loop stops only at end of input
//! or on an input I/O error.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::decode::FrameDecoder;
use crate::detect::classes::{CAT, PERSON};
use crate::detect::{ClassFilter, Detection, DetectionResult, DetectorBackend, RawDetection};
use crate::output::ResultWriter;
use crate::payload::{demux, PayloadError, ProtocolVariant};
use crate::wire::{FrameReader, ReadOutcome};

/// Detections at or below this confidence are never emitted.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Classes the detector is asked for on every frame.
pub const WATCHED_CLASSES: [usize; 2] = [PERSON, CAT];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Recoverable failure while processing one frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("image bytes did not decode")]
    Undecodable,
    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),
    #[error("failed to write result: {0}")]
    Output(#[from] io::Error),
}

/// Counters for the lifetime of one loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames_read: u64,
    pub results_emitted: u64,
    pub incomplete: u64,
    pub oversized: u64,
    pub malformed: u64,
    pub undecodable: u64,
    pub detector_errors: u64,
    pub output_errors: u64,
}

impl LoopStats {
    pub fn skipped(&self) -> u64 {
        self.incomplete
            + self.oversized
            + self.malformed
            + self.undecodable
            + self.detector_errors
            + self.output_errors
    }

    fn record(&mut self, err: &FrameError) {
        match err {
            FrameError::Payload(_) => self.malformed += 1,
            FrameError::Undecodable => self.undecodable += 1,
            FrameError::Detector(_) => self.detector_errors += 1,
            FrameError::Output(_) => self.output_errors += 1,
        }
    }
}

pub struct DetectionLoop<R, W, Dec, D> {
    reader: FrameReader<R>,
    writer: ResultWriter<W>,
    decoder: Dec,
    detector: D,
    protocol: ProtocolVariant,
    classes: ClassFilter,
    state: LoopState,
    stats: LoopStats,
    stats_interval: Duration,
    last_stats_log: Instant,
}

impl<R, W, Dec, D> DetectionLoop<R, W, Dec, D>
where
    R: Read,
    W: Write,
    Dec: FrameDecoder,
    D: DetectorBackend,
{
    /// Build a loop around an already-loaded detector.
    pub fn new(
        reader: FrameReader<R>,
        writer: ResultWriter<W>,
        decoder: Dec,
        detector: D,
        protocol: ProtocolVariant,
    ) -> Self {
        Self {
            reader,
            writer,
            decoder,
            detector,
            protocol,
            classes: ClassFilter::new(WATCHED_CLASSES),
            state: LoopState::Running,
            stats: LoopStats::default(),
            stats_interval: Duration::ZERO,
            last_stats_log: Instant::now(),
        }
    }

    /// Log statistics every `interval`. Zero disables periodic logging.
    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Release the output stream, dropping the detector.
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }

    /// Run until end of input.
    ///
    /// Returns `Ok` only on a clean end of stream.
    pub fn run(&mut self) -> Result<LoopStats> {
        let outcome = loop {
            match self.step() {
                Ok(LoopState::Running) => continue,
                Ok(LoopState::Stopped) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.log_stats();
        outcome.map(|()| self.stats.clone())
    }

    /// Run one iteration and report the resulting state.
    pub fn step(&mut self) -> Result<LoopState> {
        if self.state == LoopState::Stopped {
            return Ok(LoopState::Stopped);
        }

        let outcome = match self.reader.read_frame() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state = LoopState::Stopped;
                return Err(e).context("failed to read frame from input");
            }
        };
        let payload = match outcome {
            ReadOutcome::Frame(payload) => payload,
            ReadOutcome::EndOfStream => {
                log::info!("input closed; stopping");
                self.state = LoopState::Stopped;
                return Ok(self.state);
            }
            ReadOutcome::Incomplete { declared, received } => {
                self.stats.incomplete += 1;
                log::debug!(
                    "incomplete frame: declared {} bytes, received {}",
                    declared,
                    received
                );
                return Ok(self.state);
            }
            ReadOutcome::Oversized { declared } => {
                self.stats.oversized += 1;
                log::warn!("skipping oversized frame of {} bytes", declared);
                return Ok(self.state);
            }
        };
        self.stats.frames_read += 1;

        match self.process_frame(&payload) {
            Ok(()) => self.stats.results_emitted += 1,
            Err(e) => {
                self.stats.record(&e);
                match &e {
                    FrameError::Undecodable => log::debug!("skipping frame: {}", e),
                    _ => log::warn!("skipping frame: {}", e),
                }
            }
        }

        self.maybe_log_stats();
        Ok(self.state)
    }

    fn process_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let result = self.detect_frame(payload)?;
        self.writer.write(&result)?;
        Ok(())
    }

    fn detect_frame(&mut self, payload: &[u8]) -> Result<DetectionResult, FrameError> {
        let payload = demux(payload, self.protocol)?;
        let image = self
            .decoder
            .decode(payload.image)
            .ok_or(FrameError::Undecodable)?;
        let raw = self
            .detector
            .predict(&image, &self.classes)
            .map_err(FrameError::Detector)?;
        let detections = retain_confident(&self.detector, raw);
        Ok(DetectionResult::new(payload.source, detections))
    }

    fn maybe_log_stats(&mut self) {
        if self.stats_interval.is_zero() || self.last_stats_log.elapsed() < self.stats_interval {
            return;
        }
        self.log_stats();
        self.last_stats_log = Instant::now();
    }

    fn log_stats(&self) {
        log::info!(
            "frames={} emitted={} skipped={} (incomplete={} oversized={} malformed={} undecodable={} detector_errors={} output_errors={})",
            self.stats.frames_read,
            self.stats.results_emitted,
            self.stats.skipped(),
            self.stats.incomplete,
            self.stats.oversized,
            self.stats.malformed,
            self.stats.undecodable,
            self.stats.detector_errors,
            self.stats.output_errors
        );
    }
}

/// Apply the confidence gate and map class indices to labels.
///
/// Input order is preserved. Indices outside the detector's vocabulary are
/// dropped.
pub fn retain_confident<D: DetectorBackend + ?Sized>(
    detector: &D,
    raw: Vec<RawDetection>,
) -> Vec<Detection> {
    raw.into_iter()
        .filter(|det| det.confidence > MIN_CONFIDENCE)
        .filter_map(|det| match detector.class_name(det.class_index) {
            Some(label) => Some(Detection {
                label: label.to_string(),
                confidence: det.confidence,
                bbox: det.center_xywh,
            }),
            None => {
                log::warn!(
                    "{} reported unknown class index {}",
                    detector.name(),
                    det.class_index
                );
                None
            }
        })
        .collect()
}
