use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::prelude::*;
use ndarray_npy::NpzWriter;

use crate::errors::{CellSegError, Result};
use crate::traits::Segmentation;

/// Appended to the output base name to form the artifact file name.
pub const ARTIFACT_SUFFIX: &str = "_seg.npz";

/// Everything written for one processed image.
#[derive(Debug, Clone, Copy)]
pub struct SegmentationRecord<'a> {
    pub image: ArrayView2<'a, f32>,
    pub segmentation: &'a Segmentation,
    pub output_base: &'a Path,
}

/// Serializes image, masks, flows, styles and diameter into one NPZ archive per image.
///
/// Archive members: `img`, `masks`, `flows_<i>` for each flow array, `styles`,
/// `diameter` (0-d, NaN when unknown) and `filename` (UTF-8 bytes of the output
/// base name).
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultWriter;

impl ResultWriter {
    pub const fn new() -> Self {
        Self
    }

    /// `<output_base>_seg.npz`
    pub fn artifact_path(output_base: &Path) -> PathBuf {
        let mut name = OsString::from(output_base.as_os_str());
        name.push(ARTIFACT_SUFFIX);
        PathBuf::from(name)
    }

    /// Writes a single image. Equivalent to a one-item batch.
    pub fn write<'a>(
        &self,
        image: ArrayView2<'a, f32>,
        segmentation: &'a Segmentation,
        output_base: &'a Path,
    ) -> Result<PathBuf> {
        let record = SegmentationRecord {
            image,
            segmentation,
            output_base,
        };

        self.write_batch(&[record])?
            .pop()
            .ok_or_else(|| CellSegError::Validation {
                field: "batch".to_string(),
                reason: "produced no artifact".to_string(),
            })
    }

    /// Writes one artifact per record, stopping at the first failure.
    pub fn write_batch(&self, records: &[SegmentationRecord<'_>]) -> Result<Vec<PathBuf>> {
        records.iter().map(|record| self.write_one(record)).collect()
    }

    fn write_one(&self, record: &SegmentationRecord<'_>) -> Result<PathBuf> {
        let path = Self::artifact_path(record.output_base);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CellSegError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create artifact directory".to_string(),
                source: e,
            })?;
        }

        // The archive is assembled next to its destination and renamed into place,
        // so an earlier artifact is only replaced by a complete one.
        let partial = path.with_extension("npz.partial");
        if let Err(e) = write_archive(&partial, record) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, &path).map_err(|e| CellSegError::FileSystem {
            path: path.clone(),
            operation: "replace artifact".to_string(),
            source: e,
        })?;

        Ok(path)
    }
}

fn write_archive(path: &Path, record: &SegmentationRecord<'_>) -> Result<()> {
    let serialization_error = |source: Box<dyn std::error::Error + Send + Sync>| {
        CellSegError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    };

    let file = File::create(path).map_err(|e| CellSegError::FileSystem {
        path: path.to_path_buf(),
        operation: "create artifact".to_string(),
        source: e,
    })?;

    let segmentation = record.segmentation;
    let mut npz = NpzWriter::new_compressed(BufWriter::new(file));

    npz.add_array("img", &record.image)
        .map_err(|e| serialization_error(Box::new(e)))?;
    npz.add_array("masks", &segmentation.masks)
        .map_err(|e| serialization_error(Box::new(e)))?;
    for (index, flow) in segmentation.flows.iter().enumerate() {
        npz.add_array(format!("flows_{index}"), flow)
            .map_err(|e| serialization_error(Box::new(e)))?;
    }
    npz.add_array("styles", &segmentation.styles)
        .map_err(|e| serialization_error(Box::new(e)))?;
    npz.add_array("diameter", &arr0(segmentation.diameter.unwrap_or(f32::NAN)))
        .map_err(|e| serialization_error(Box::new(e)))?;

    let filename = record.output_base.to_string_lossy().into_owned().into_bytes();
    npz.add_array("filename", &Array1::from(filename))
        .map_err(|e| serialization_error(Box::new(e)))?;

    let mut writer = npz.finish().map_err(|e| serialization_error(Box::new(e)))?;
    writer.flush().map_err(|e| CellSegError::FileSystem {
        path: path.to_path_buf(),
        operation: "flush artifact".to_string(),
        source: e,
    })?;

    Ok(())
}
