use crate::errors::Result;
use ndarray::prelude::*;

/// Outputs of one segmentation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Per-pixel instance labels, 0 is background. Same shape as the input plane.
    pub masks: Array2<u32>,
    /// Flow fields as produced by the model, kept opaque.
    pub flows: Vec<ArrayD<f32>>,
    /// Style vector of the image.
    pub styles: Array1<f32>,
    /// Estimated object diameter in pixels, when the model reports one.
    pub diameter: Option<f32>,
}

impl Segmentation {
    /// Number of distinct labelled objects.
    pub fn object_count(&self) -> usize {
        let mut labels: Vec<u32> = self.masks.iter().copied().filter(|&l| l != 0).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }
}

/// Abstraction over the cell-segmentation model.
///
/// The driver depends only on this trait, so the pipeline runs against the ONNX
/// backend in production and against a mock in tests. Implementations estimate
/// object size themselves; no diameter hint is passed.
pub trait CellSegmentationModel: Send + Sync {
    fn infer(&self, image: ArrayView2<f32>) -> Result<Segmentation>;
}

impl<M: CellSegmentationModel + ?Sized> CellSegmentationModel for &M {
    fn infer(&self, image: ArrayView2<f32>) -> Result<Segmentation> {
        (**self).infer(image)
    }
}

impl<M: CellSegmentationModel + ?Sized> CellSegmentationModel for Box<M> {
    fn infer(&self, image: ArrayView2<f32>) -> Result<Segmentation> {
        (**self).infer(image)
    }
}
