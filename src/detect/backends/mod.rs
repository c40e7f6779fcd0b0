pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Build a backend by name ("tract" or "stub").
pub fn build_backend(
    name: &str,
    model_path: &Path,
    labels: &[String],
) -> Result<Box<dyn DetectorBackend>> {
    match name {
        "stub" => Ok(Box::new(StubBackend::new(labels.to_vec()))),
        "tract" => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(TractBackend::new(model_path, labels.to_vec())?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                let _ = model_path;
                Err(anyhow!(
                    "ONNX inference requires the backend-tract feature"
                ))
            }
        }
        other => Err(anyhow!(
            "unknown detector backend '{}'; expected tract or stub",
            other
        )),
    }
}
