//! Object detection: backend trait, concrete backends and the confidence
//! filter that turns raw model output into a per-frame count.

mod backend;
mod backends;
mod filter;
mod result;

use anyhow::Result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
pub use filter::{filter_detections, Filtered};
pub use result::{BoundingBox, RawDetection};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;

/// Open the detector backend for a model path and target device.
///
/// `stub://` model paths select the deterministic stub backend regardless of
/// device; anything else is treated as an ONNX model for the tract backend.
/// Fails when the device cannot run the model or when no inference backend
/// is compiled in, both fatal at startup.
pub fn load_backend(
    model: &str,
    device: &str,
    in_flight: usize,
) -> Result<Box<dyn DetectorBackend>> {
    if model.starts_with("stub://") {
        log::info!("detector: stub backend for {} (device {})", model, device);
        return Ok(Box::new(StubBackend::new(in_flight)));
    }

    #[cfg(feature = "backend-tract")]
    {
        let backend = TractBackend::load(model, device, in_flight)?;
        log::info!("detector: tract backend loaded {} on {}", model, device);
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        anyhow::bail!(
            "model {} requires ONNX inference (enable the backend-tract feature)",
            model
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_model_path_selects_stub_backend() -> Result<()> {
        let backend = load_backend("stub://person", "CPU", 1)?;
        assert_eq!(backend.name(), "stub");
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn onnx_model_without_backend_is_a_startup_error() {
        assert!(load_backend("person-detection.onnx", "CPU", 1).is_err());
    }
}
