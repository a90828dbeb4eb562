use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::channel::ChannelSpec;
use crate::errors::{CellSegError, Result};
use crate::manifest::ManifestRecord;

/// Input file of one (record, channel) pair and where its artifact goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub input_path: PathBuf,
    /// Output path without extension; the writer appends the artifact suffix.
    pub output_base: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    data_dir: PathBuf,
    output_dir: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir,
        }
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Creates the configured output directory. Idempotent; a no-op without one.
    pub fn prepare(&self) -> Result<()> {
        let Some(output_dir) = &self.output_dir else {
            return Ok(());
        };

        fs::create_dir_all(output_dir).map_err(|e| CellSegError::FileSystem {
            path: output_dir.clone(),
            operation: "create output directory".to_string(),
            source: e,
        })?;
        info!("Writing segmentations to {}", output_dir.display());
        Ok(())
    }

    /// Resolves the channel's file for `record`, or `None` when the record lacks
    /// its filename or directory.
    ///
    /// With an output directory, artifacts are flattened into it by filename stem;
    /// otherwise they sit beside the input image. A filename with no stem, such
    /// as `..`, is a validation error.
    pub fn resolve(
        &self,
        record: &ManifestRecord,
        channel: &ChannelSpec,
    ) -> Result<Option<ResolvedPath>> {
        let (Some(filename), Some(directory)) = (
            record.get(&channel.filename_column),
            record.get(&channel.path_column),
        ) else {
            return Ok(None);
        };

        let input_path = self.data_dir.join(directory).join(filename);
        let stem = Path::new(filename)
            .file_stem()
            .ok_or_else(|| CellSegError::Validation {
                field: channel.filename_column.clone(),
                reason: format!("`{filename}` does not name a file"),
            })?;

        let output_base = match &self.output_dir {
            Some(output_dir) => output_dir.join(stem),
            None => input_path
                .parent()
                .map_or_else(|| PathBuf::from(stem), |parent| parent.join(stem)),
        };

        Ok(Some(ResolvedPath {
            input_path,
            output_base,
        }))
    }
}
