use std::path::Path;

use crate::{
    errors::{CellSegError, Result},
    traits::{CellSegmentationModel, Segmentation},
};
use ndarray::prelude::*;
use ort::value::{DynValue, TensorRef};
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

/// Graph output holding the instance label map.
pub const MASKS_OUTPUT: &str = "masks";
/// Graph output holding the flow field, typically `(1, 3, H, W)`.
pub const FLOWS_OUTPUT: &str = "flows";
/// Graph output holding the style vector.
pub const STYLES_OUTPUT: &str = "styles";
/// Optional graph output with the estimated object diameter.
pub const DIAMETER_OUTPUT: &str = "diameter";

/// Cell segmentation network exported to ONNX, run through ONNX Runtime.
///
/// The graph takes one `(1, 1, H, W)` float tensor and yields `masks`, `flows`
/// and `styles`, plus `diameter` when the export performs size estimation.
pub struct Model {
    input_name: String,
    session: Mutex<Session>,
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| CellSegError::Model {
                operation: "initialize session builder".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| CellSegError::Model {
                operation: "configure execution providers".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| CellSegError::Model {
                operation: "enable memory pattern".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| CellSegError::Model {
                operation: format!("load model file: {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| CellSegError::Validation {
                field: "model".to_string(),
                reason: format!("{} declares no inputs", model_path.display()),
            })?;

        Ok(Self {
            input_name,
            session: Mutex::new(session),
        })
    }

    fn run(&self, image: ArrayView2<f32>) -> Result<Segmentation> {
        let tensor = image.insert_axis(Axis(0)).insert_axis(Axis(0));

        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let required_output = |name: &str| {
            outputs.get(name).ok_or_else(|| CellSegError::Validation {
                field: "model".to_string(),
                reason: format!("graph has no `{name}` output"),
            })
        };

        let masks = extract_labels(required_output(MASKS_OUTPUT)?)?;
        let masks = squeeze_leading(masks).into_dimensionality::<Ix2>()?;

        let flows = required_output(FLOWS_OUTPUT)?
            .try_extract_array::<f32>()?
            .to_owned();
        let flows = squeeze_leading_to(flows, 3);

        let styles = required_output(STYLES_OUTPUT)?
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect::<Array1<f32>>();

        let diameter = match outputs.get(DIAMETER_OUTPUT) {
            Some(value) => value.try_extract_array::<f32>()?.iter().next().copied(),
            None => None,
        };

        Ok(Segmentation {
            masks,
            flows: vec![flows],
            styles,
            diameter,
        })
    }
}

impl CellSegmentationModel for Model {
    fn infer(&self, image: ArrayView2<f32>) -> Result<Segmentation> {
        self.run(image)
    }
}

/// Label maps are exported as int64, int32 or float depending on the converter.
fn extract_labels(value: &DynValue) -> Result<ArrayD<u32>> {
    if let Ok(labels) = value.try_extract_array::<i64>() {
        return Ok(labels.mapv(|l| u32::try_from(l).unwrap_or(0)));
    }
    if let Ok(labels) = value.try_extract_array::<i32>() {
        return Ok(labels.mapv(|l| u32::try_from(l).unwrap_or(0)));
    }
    Ok(value
        .try_extract_array::<f32>()?
        .mapv(|l| if l > 0.0 { l.round() as u32 } else { 0 }))
}

/// Drops leading unit axes (batch, channel) until the array is 2-D.
fn squeeze_leading<T>(array: ArrayD<T>) -> ArrayD<T> {
    squeeze_leading_to(array, 2)
}

fn squeeze_leading_to<T>(mut array: ArrayD<T>, ndim: usize) -> ArrayD<T> {
    while array.ndim() > ndim && array.shape()[0] == 1 {
        array = array.index_axis_move(Axis(0), 0);
    }
    array
}
