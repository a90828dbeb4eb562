use std::path::Path;

use image::DynamicImage;
use ndarray::prelude::*;
use tracing::{error, info, warn};

use crate::errors::{CellSegError, Result};
use crate::traits::{CellSegmentationModel, Segmentation};

/// What happened to one input file.
#[derive(Debug)]
pub enum AdapterOutcome {
    Segmented {
        /// The 2-D plane that was actually segmented.
        image: Array2<f32>,
        segmentation: Segmentation,
    },
    MissingFile,
    Empty,
}

/// Wraps one inference call per image around a shared, read-only model.
pub struct InferenceAdapter<'m, M: CellSegmentationModel> {
    model: &'m M,
}

impl<'m, M: CellSegmentationModel> InferenceAdapter<'m, M> {
    pub const fn new(model: &'m M) -> Self {
        Self { model }
    }

    /// Decodes `path` and segments it.
    ///
    /// A missing file or an empty image is reported as an outcome, not an error;
    /// decode and inference failures are returned for the caller to log and skip.
    pub fn process(&self, path: &Path) -> Result<AdapterOutcome> {
        if !path.is_file() {
            warn!("Image file not found, skipping: {}", path.display());
            return Ok(AdapterOutcome::MissingFile);
        }

        info!("Processing image: {}", path.display());
        let decoded = decode_image(path)?;
        self.segment_array(decoded, path)
    }

    /// Segments an already decoded array. `path` only labels log entries and errors.
    pub fn segment_array(&self, decoded: ArrayD<f32>, path: &Path) -> Result<AdapterOutcome> {
        if decoded.is_empty() {
            error!(
                "Image loaded but is empty (shape {:?}): {}",
                decoded.shape(),
                path.display()
            );
            return Ok(AdapterOutcome::Empty);
        }

        let image = reduce_to_plane(decoded, path)?;
        let segmentation = self.infer(image.view(), path)?;

        Ok(AdapterOutcome::Segmented {
            image,
            segmentation,
        })
    }

    fn infer(&self, image: ArrayView2<f32>, path: &Path) -> Result<Segmentation> {
        let segmentation = self
            .model
            .infer(image)
            .map_err(|e| CellSegError::ImageProcessing {
                path: path.display().to_string(),
                operation: "segmentation".to_string(),
                source: Box::new(e),
            })?;

        if segmentation.masks.dim() != image.dim() {
            return Err(CellSegError::Validation {
                field: "masks".to_string(),
                reason: format!(
                    "shape {:?} does not match image shape {:?} for {}",
                    segmentation.masks.dim(),
                    image.dim(),
                    path.display()
                ),
            });
        }

        Ok(segmentation)
    }
}

/// Decodes an image file into an `f32` array.
///
/// Grayscale images become `(height, width)`; colour images become channel-first
/// `(channels, height, width)`. Intensities are scaled to `[0, 1]`.
pub fn decode_image(path: &Path) -> Result<ArrayD<f32>> {
    let image = image::open(path).map_err(|e| CellSegError::ImageProcessing {
        path: path.display().to_string(),
        operation: "decode".to_string(),
        source: Box::new(e),
    })?;

    image_to_array(&image)
}

pub fn image_to_array(image: &DynamicImage) -> Result<ArrayD<f32>> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let color = image.color();

    if !color.has_color() {
        let luma = image.to_luma32f();
        return Ok(Array2::from_shape_vec((height, width), luma.into_raw())?.into_dyn());
    }

    let (channels, raw) = if color.has_alpha() {
        (4, image.to_rgba32f().into_raw())
    } else {
        (3, image.to_rgb32f().into_raw())
    };

    Ok(Array3::from_shape_vec((height, width, channels), raw)?
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned()
        .into_dyn())
}

/// Reduces an array to the 2-D plane handed to the model.
///
/// Extra leading axes (colour channels, z-stacks, time points) are dropped by
/// keeping index 0 of each. This is lossy, so it is always logged as a warning.
pub fn reduce_to_plane(array: ArrayD<f32>, path: &Path) -> Result<Array2<f32>> {
    if array.ndim() < 2 {
        return Err(CellSegError::Validation {
            field: "image".to_string(),
            reason: format!(
                "{} has {} dimension(s), expected at least 2",
                path.display(),
                array.ndim()
            ),
        });
    }

    if array.ndim() > 2 {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        warn!(
            "Image {name} has {} dimensions (shape {:?}). Using only the first slice of each \
             leading axis; the remaining data is discarded.",
            array.ndim(),
            array.shape()
        );
    }

    let mut array = array;
    while array.ndim() > 2 {
        array = array.index_axis_move(Axis(0), 0);
    }

    Ok(array.into_dimensionality::<Ix2>()?)
}
