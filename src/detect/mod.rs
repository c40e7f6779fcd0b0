mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{build_backend, StubBackend};
pub use result::{non_max_suppression, BoundingBox, Detection};
