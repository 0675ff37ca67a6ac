use anyhow::Result;

use crate::decode::DecodedImage;
use crate::detect::backend::{ClassFilter, DetectorBackend};
use crate::detect::classes::coco_name;
use crate::detect::result::RawDetection;

/// Scripted backend for testing and pipeline smoke runs.
///
/// Returns the same configured candidates for every frame, restricted to the
/// requested classes. With no script it reports nothing, which still drives
/// an empty result line per frame.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    script: Vec<RawDetection>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(script: Vec<RawDetection>) -> Self {
        Self { script, calls: 0 }
    }

    /// Number of `predict` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_name(&self, class_index: usize) -> Option<&str> {
        coco_name(class_index)
    }

    fn predict(&mut self, _image: &DecodedImage, classes: &ClassFilter) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        Ok(self
            .script
            .iter()
            .filter(|det| classes.contains(det.class_index))
            .copied()
            .collect())
    }
}
