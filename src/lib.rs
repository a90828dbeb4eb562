pub mod adapter;
pub mod channel;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod model;
pub mod resolver;
pub mod summary;
pub mod traits;
pub mod writer;

pub mod mocks;

mod progress_tracker;

use tracing::{error, info, warn};

pub use adapter::{AdapterOutcome, InferenceAdapter};
pub use channel::ChannelSpec;
pub use config::Config;
pub use errors::{CellSegError, Result};
pub use manifest::{Manifest, ManifestRecord};
pub use model::Model;
pub use resolver::{PathResolver, ResolvedPath};
pub use summary::{ChannelOutcome, RunSummary};
pub use traits::*;
pub use writer::ResultWriter;

use progress_tracker::ProgressTracker;

/// Runs every configured channel of every manifest row through the model.
///
/// Rows and channels are isolated from each other: missing metadata, a missing
/// file or any decode/inference/write error is logged and recorded in the
/// summary, and processing moves on.
pub struct ManifestProcessor<M: CellSegmentationModel> {
    model: M,
    config: Config,
    resolver: PathResolver,
    writer: ResultWriter,
}

impl<M: CellSegmentationModel> ManifestProcessor<M> {
    pub fn new(model: M, config: Config) -> Self {
        let resolver = PathResolver::new(config.data_dir.clone(), config.output_dir.clone());
        Self {
            model,
            config,
            resolver,
            writer: ResultWriter::new(),
        }
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Loads the configured manifest, then builds the model with `build_model`.
    ///
    /// The manifest comes first so that a missing or unparsable manifest fails
    /// the run before any (possibly slow) model initialization.
    pub fn load<F>(config: Config, build_model: F) -> Result<(Self, Manifest)>
    where
        F: FnOnce(&Config) -> Result<M>,
    {
        let manifest = load_manifest(&config)?;
        let model = build_model(&config).inspect_err(|e| error!(error = ?e, "{e}"))?;
        Ok((Self::new(model, config), manifest))
    }

    /// Loads and processes the whole manifest.
    ///
    /// Only a missing/unparsable manifest or an uncreatable output directory is
    /// returned as an error; both happen before any inference.
    pub fn run(&self) -> Result<RunSummary> {
        let manifest = load_manifest(&self.config)?;
        self.run_manifest(&manifest)
    }

    /// Processes every row of an already loaded manifest.
    pub fn run_manifest(&self, manifest: &Manifest) -> Result<RunSummary> {
        manifest.validate_channels(&self.config.channels);
        self.resolver
            .prepare()
            .inspect_err(|e| error!(error = ?e, "{e}"))?;

        let progress = ProgressTracker::new(manifest.len(), self.config.progress);
        let mut summary = RunSummary::default();

        info!("Starting image processing...");
        for record in manifest.records() {
            info!("Processing row {}/{}", record.row(), manifest.len());
            for outcome in self.process_record(record) {
                summary.record(&outcome);
            }
            summary.rows += 1;
            progress.inc();
        }
        progress.finish();

        summary.log();
        Ok(summary)
    }

    /// Processes each configured channel of one row, in configuration order.
    pub fn process_record(&self, record: &ManifestRecord) -> Vec<ChannelOutcome> {
        self.config
            .channels
            .iter()
            .map(|channel| self.process_channel(record, channel))
            .collect()
    }

    fn process_channel(&self, record: &ManifestRecord, channel: &ChannelSpec) -> ChannelOutcome {
        let resolved = match self.resolver.resolve(record, channel) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                warn!(
                    "Row {}: Missing {} filename or path.",
                    record.row(),
                    channel.name
                );
                return ChannelOutcome::MissingMetadata;
            }
            Err(e) => {
                error!(
                    row = record.row(),
                    channel = %channel.name,
                    error = ?e,
                    "Row {}: Invalid {} filename: {e}",
                    record.row(),
                    channel.name
                );
                return ChannelOutcome::Failed(e.to_string());
            }
        };

        match self.segment_and_save(&resolved) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    row = record.row(),
                    channel = %channel.name,
                    error = ?e,
                    "Error processing image {}: {e}",
                    resolved.input_path.display()
                );
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    fn segment_and_save(&self, resolved: &ResolvedPath) -> Result<ChannelOutcome> {
        let adapter = InferenceAdapter::new(&self.model);

        match adapter.process(&resolved.input_path)? {
            AdapterOutcome::MissingFile => Ok(ChannelOutcome::MissingFile),
            AdapterOutcome::Empty => Ok(ChannelOutcome::EmptyImage),
            AdapterOutcome::Segmented {
                image,
                segmentation,
            } => {
                let path = self
                    .writer
                    .write(image.view(), &segmentation, &resolved.output_base)?;
                info!(
                    objects = segmentation.object_count(),
                    "Saved segmentation to: {}",
                    path.display()
                );
                Ok(ChannelOutcome::Saved(path))
            }
        }
    }
}

// Constructor that wires in the ONNX backend.
impl ManifestProcessor<Model> {
    pub fn with_onnx_model(config: Config) -> Result<(Self, Manifest)> {
        Self::load(config, |config| {
            if !config.model_path.is_file() {
                return Err(CellSegError::FileSystem {
                    path: config.model_path.clone(),
                    operation: "open model file".to_string(),
                    source: std::io::ErrorKind::NotFound.into(),
                });
            }
            Model::new(&config.model_path, config.device_id)
        })
    }
}

fn load_manifest(config: &Config) -> Result<Manifest> {
    let manifest = Manifest::from_path(&config.manifest, config.delimiter)
        .inspect_err(|e| error!(error = ?e, "{e}"))?;
    info!(
        "Successfully loaded manifest: {} ({} rows)",
        config.manifest.display(),
        manifest.len()
    );
    Ok(manifest)
}
