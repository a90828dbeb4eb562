use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::prelude::*;
use parking_lot::Mutex;

use crate::errors::{CellSegError, Result};
use crate::traits::{CellSegmentationModel, Segmentation};

/// Length of the style vector returned by the mock.
pub const MOCK_STYLE_LEN: usize = 256;

/// Test double for the segmentation model.
///
/// Thresholds the plane at half intensity into a single object, records the shape
/// of every plane it receives, and can be told to fail every call or to return
/// masks of a fixed shape.
#[derive(Debug, Default)]
pub struct MockSegmentationModel {
    calls: AtomicUsize,
    shapes: Mutex<Vec<(usize, usize)>>,
    fail: bool,
    mask_shape: Option<(usize, usize)>,
}

impl MockSegmentationModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model whose every inference call returns an error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// A model that answers every plane with an empty mask of `shape`.
    pub fn with_mask_shape(shape: (usize, usize)) -> Self {
        Self {
            mask_shape: Some(shape),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(height, width)` of each plane passed to `infer`, in call order.
    pub fn shapes(&self) -> Vec<(usize, usize)> {
        self.shapes.lock().clone()
    }
}

impl CellSegmentationModel for MockSegmentationModel {
    fn infer(&self, image: ArrayView2<f32>) -> Result<Segmentation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.shapes.lock().push(image.dim());

        if self.fail {
            return Err(CellSegError::Model {
                operation: "mock inference".to_string(),
                source: "mock model configured to fail".into(),
            });
        }

        let (height, width) = image.dim();
        let masks = match self.mask_shape {
            Some(shape) => Array2::zeros(shape),
            None => image.mapv(|v| u32::from(v >= 0.5)),
        };
        Ok(Segmentation {
            masks,
            flows: vec![ArrayD::zeros(IxDyn(&[3, height, width]))],
            styles: Array1::zeros(MOCK_STYLE_LEN),
            diameter: Some(30.0),
        })
    }
}
