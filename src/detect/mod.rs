//! Object detection backends.
//!
//! The detection loop talks to a single `DetectorBackend` chosen at startup
//! by `load_backend`. Backends report raw candidates for the requested
//! classes; the loop owns the confidence gate and label mapping.

mod backend;
mod backends;
pub mod classes;
mod registry;
mod result;

pub use backend::{ClassFilter, DetectorBackend};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{load_backend, BackendKind};
pub use result::{Detection, DetectionResult, RawDetection};
