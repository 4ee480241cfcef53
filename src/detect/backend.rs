use anyhow::Result;

use crate::detect::result::RawDetection;
use crate::preprocess::{InputShape, InputTensor};

/// Detector backend trait.
///
/// Models the submit/wait/collect cycle of an asynchronous inference engine:
/// a request is submitted into a numbered slot, awaited, and its output taken
/// exactly once. Synchronous engines run the pass inside `submit` and park
/// the result in the slot; the calling driver drains slots in submission
/// order either way, so completion order never reaches the tracker.
///
/// Constructors take the model path, target device and slot count, and must
/// fail loudly when the device cannot run the model's operations. That is a
/// startup configuration error, not something to degrade around.
pub trait DetectorBackend: Send {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    /// Input tensor geometry the loaded model expects.
    fn input_shape(&self) -> InputShape;

    /// Begin inference on `input` in `slot`. The slot must be empty.
    fn submit(&mut self, slot: usize, input: InputTensor) -> Result<()>;

    /// Block until the request in `slot` has completed.
    fn wait(&mut self, slot: usize) -> Result<()>;

    /// Take the completed detections out of `slot`, freeing it.
    fn take_output(&mut self, slot: usize) -> Result<Vec<RawDetection>>;
}
