use std::path::PathBuf;

use tracing::{info, warn};

/// Result of processing one channel of one manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Saved(PathBuf),
    MissingMetadata,
    MissingFile,
    EmptyImage,
    Failed(String),
}

/// Tally of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows: usize,
    pub saved: usize,
    pub missing_metadata: usize,
    pub missing_files: usize,
    pub empty_images: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ChannelOutcome) {
        match outcome {
            ChannelOutcome::Saved(_) => self.saved += 1,
            ChannelOutcome::MissingMetadata => self.missing_metadata += 1,
            ChannelOutcome::MissingFile => self.missing_files += 1,
            ChannelOutcome::EmptyImage => self.empty_images += 1,
            ChannelOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub const fn attempted(&self) -> usize {
        self.saved + self.missing_metadata + self.missing_files + self.empty_images + self.failed
    }

    /// Channels that had metadata but produced no artifact.
    pub const fn unsuccessful(&self) -> usize {
        self.missing_files + self.empty_images + self.failed
    }

    pub const fn is_clean(&self) -> bool {
        self.unsuccessful() == 0
    }

    pub fn log(&self) {
        info!(
            rows = self.rows,
            saved = self.saved,
            missing_metadata = self.missing_metadata,
            missing_files = self.missing_files,
            empty_images = self.empty_images,
            failed = self.failed,
            "Finished processing all images."
        );
        if self.attempted() > 0 && self.saved == 0 {
            warn!("No segmentation was saved in this run");
        }
    }
}
