use std::collections::BTreeSet;

use anyhow::Result;

use crate::decode::DecodedImage;
use crate::detect::result::RawDetection;

/// Set of class indices a backend is asked to report.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassFilter {
    classes: BTreeSet<usize>,
}

impl ClassFilter {
    pub fn new<I: IntoIterator<Item = usize>>(classes: I) -> Self {
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn contains(&self, class_index: usize) -> bool {
        self.classes.contains(&class_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.classes.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Object detector backend.
///
/// A backend is loaded once at startup and owned by the detection loop for
/// the lifetime of the process. Calls are strictly sequential.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class label for an index in this backend's vocabulary.
    fn class_name(&self, class_index: usize) -> Option<&str>;

    /// Run detection on a decoded frame.
    ///
    /// Only classes in `classes` are reported. Confidence gating beyond the
    /// backend's own candidate threshold is the caller's job.
    fn predict(&mut self, image: &DecodedImage, classes: &ClassFilter) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn class_name(&self, class_index: usize) -> Option<&str> {
        (**self).class_name(class_index)
    }

    fn predict(&mut self, image: &DecodedImage, classes: &ClassFilter) -> Result<Vec<RawDetection>> {
        (**self).predict(image, classes)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
