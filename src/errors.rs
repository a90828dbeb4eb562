use std::path::PathBuf;
use thiserror::Error;

/// Boxed source error carried by the image and model variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the manifest segmentation pipeline.
///
/// Each variant carries the context of its failure domain (manifest, filesystem,
/// image decoding, model inference, artifact serialization) so the driver can log
/// a complete diagnostic line without parsing error strings.
#[derive(Error, Debug)]
pub enum CellSegError {
    #[error("Manifest error: failed to load {path:?}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Serialization error: writing {path:?} failed")]
    Serialization {
        path: PathBuf,
        #[source]
        source: BoxedSource,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, CellSegError>;

/// Convert I/O errors to filesystem errors.
///
/// Some I/O errors surface without a specific path/operation context. Code that
/// has the context should construct `CellSegError::FileSystem` directly.
impl From<std::io::Error> for CellSegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for CellSegError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for CellSegError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to model errors.
///
/// Shape errors occur while moving pixel data in and out of tensors, which is
/// part of inference, so they stay in the model category.
impl From<ndarray::ShapeError> for CellSegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_error_conversion_keeps_source() {
        let err: CellSegError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();

        assert!(matches!(err, CellSegError::FileSystem { .. }));
        assert_eq!(err.source().map(|s| s.to_string()), Some("missing".into()));
    }

    #[test]
    fn test_validation_message() {
        let err = CellSegError::Validation {
            field: "masks".to_string(),
            reason: "shape (2, 2) does not match image shape (3, 3)".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Validation error: masks shape (2, 2) does not match image shape (3, 3)"
        );
    }
}
