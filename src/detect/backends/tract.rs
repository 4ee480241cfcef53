#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::preprocess::{InputShape, InputTensor};

/// Input geometry of the person-detection model.
const MODEL_HEIGHT: u32 = 320;
const MODEL_WIDTH: u32 = 544;
/// Values per output row: [image_id, label, confidence, xmin, ymin, xmax, ymax].
const ROW_LEN: usize = 7;

/// Tract-based backend for ONNX person detection on the CPU.
///
/// Tract runs synchronously, so `submit` executes the pass immediately and
/// parks the parsed detections in the requested slot; `wait` is then a
/// completion check. Slot draining order is up to the caller.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    shape: InputShape,
    slots: Vec<Option<Vec<RawDetection>>>,
}

impl TractBackend {
    /// Load an ONNX model and prepare `in_flight` request slots.
    ///
    /// Only the CPU device is supported; requesting any other device is the
    /// unsupported-operations startup error the operator must fix.
    pub fn load<P: AsRef<Path>>(model_path: P, device: &str, in_flight: usize) -> Result<Self> {
        if !device.eq_ignore_ascii_case("cpu") {
            return Err(anyhow!(
                "device {} does not support the operations required by this model (tract backend is CPU-only)",
                device
            ));
        }

        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, MODEL_HEIGHT as usize, MODEL_WIDTH as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            shape: InputShape {
                channels: 3,
                height: MODEL_HEIGHT,
                width: MODEL_WIDTH,
            },
            slots: vec![None; in_flight.max(1)],
        })
    }

    fn run_pass(&self, input: InputTensor) -> Result<Vec<RawDetection>> {
        if input.shape != self.shape {
            return Err(anyhow!(
                "input tensor {}x{} does not match model input {}x{}",
                input.shape.width,
                input.shape.height,
                self.shape.width,
                self.shape.height
            ));
        }

        let tensor = tract_ndarray::Array4::from_shape_vec(
            (
                1,
                self.shape.channels as usize,
                self.shape.height as usize,
                self.shape.width as usize,
            ),
            input.data,
        )
        .context("input tensor length does not match its shape")?
        .into_tensor();

        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = rows.iter().copied().collect();

        parse_detection_rows(&values)
    }
}

/// Parse flattened `[image_id, label, confidence, xmin, ymin, xmax, ymax]`
/// rows. A negative image id terminates the list.
fn parse_detection_rows(values: &[f32]) -> Result<Vec<RawDetection>> {
    let mut detections = Vec::new();
    for row in values.chunks_exact(ROW_LEN) {
        if row[0] < 0.0 {
            break;
        }
        detections.push(RawDetection {
            confidence: row[2],
            xmin: row[3],
            ymin: row[4],
            xmax: row[5],
            ymax: row[6],
        });
    }
    Ok(detections)
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn submit(&mut self, slot: usize, input: InputTensor) -> Result<()> {
        if self
            .slots
            .get(slot)
            .ok_or_else(|| anyhow!("tract backend has no slot {}", slot))?
            .is_some()
        {
            return Err(anyhow!("tract backend slot {} is already in flight", slot));
        }
        let detections = self.run_pass(input)?;
        self.slots[slot] = Some(detections);
        Ok(())
    }

    fn wait(&mut self, slot: usize) -> Result<()> {
        match self.slots.get(slot) {
            Some(Some(_)) => Ok(()),
            Some(None) => Err(anyhow!("tract backend slot {} has no pending request", slot)),
            None => Err(anyhow!("tract backend has no slot {}", slot)),
        }
    }

    fn take_output(&mut self, slot: usize) -> Result<Vec<RawDetection>> {
        self.slots
            .get_mut(slot)
            .ok_or_else(|| anyhow!("tract backend has no slot {}", slot))?
            .take()
            .ok_or_else(|| anyhow!("tract backend slot {} has no completed request", slot))
    }
}
