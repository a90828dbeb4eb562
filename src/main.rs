use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cellseg_rs::{Config, ManifestProcessor};

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config = Config::parse();

    if !config.data_dir.is_dir() {
        warn!(
            "Data directory {} does not exist; every image will be reported missing",
            config.data_dir.display()
        );
    }

    let strict = config.strict;
    let (processor, manifest) = ManifestProcessor::with_onnx_model(config)
        .context("Failed to load the manifest and the segmentation model")?;
    let summary = processor.run_manifest(&manifest)?;

    ensure!(
        !strict || summary.is_clean(),
        "{} image(s) could not be segmented",
        summary.unsuccessful()
    );

    Ok(())
}
