use serde::Serialize;

/// Raw detector output for one object, before the confidence gate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    /// Index into the backend's class vocabulary.
    pub class_index: usize,
    pub confidence: f32,
    /// Center-x, center-y, width, height in source image pixels.
    pub center_xywh: [f32; 4],
}

/// One retained detection, as emitted on the result stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
}

/// Per-frame result record.
///
/// `detections` is always serialized, even when empty; consumers use the
/// empty list to track absence.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(source: Option<String>, detections: Vec<Detection>) -> Self {
        Self { source, detections }
    }
}
