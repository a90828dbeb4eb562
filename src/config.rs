use clap::Parser;
use std::path::PathBuf;

use crate::channel::ChannelSpec;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Delimited manifest with one image record per row
    pub manifest: PathBuf,

    /// Base directory that the manifest's path columns are relative to
    #[arg(short = 'D', long)]
    pub data_dir: PathBuf,

    /// Flat output directory; artifacts are written beside each input image when omitted
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    #[arg(short, long)]
    pub model_path: PathBuf,

    /// Channel to segment, as NAME or NAME=FILENAME_COLUMN,PATH_COLUMN (repeatable)
    #[arg(short, long = "channel", default_values_t = ChannelSpec::defaults())]
    pub channels: Vec<ChannelSpec>,

    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    pub delimiter: u8,

    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// Show a progress bar over manifest rows
    #[arg(long)]
    pub progress: bool,

    /// Exit with an error when any image could not be segmented
    #[arg(long)]
    pub strict: bool,
}

impl Config {
    /// Configuration for library callers, with the CLI defaults for everything
    /// besides the three required paths.
    pub fn new(
        manifest: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            manifest: manifest.into(),
            data_dir: data_dir.into(),
            output_dir: None,
            model_path: model_path.into(),
            channels: ChannelSpec::defaults(),
            delimiter: b',',
            device_id: 0,
            progress: false,
            strict: false,
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    pub fn with_channels(mut self, channels: Vec<ChannelSpec>) -> Self {
        self.channels = channels;
        self
    }

    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        _ => match s.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(format!("{s} is not a single ASCII delimiter character")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let config = Config::parse_from([
            "cellseg-rs",
            "images.csv",
            "--data-dir",
            "data",
            "--model-path",
            "cyto3.onnx",
        ]);

        assert_eq!(config.manifest, PathBuf::from("images.csv"));
        assert_eq!(config.output_dir, None);
        assert_eq!(config.channels, ChannelSpec::defaults());
        assert_eq!(config.delimiter, b',');
        assert!(!config.strict);
    }

    #[test]
    fn test_cli_channels_and_delimiter() {
        let config = Config::parse_from([
            "cellseg-rs",
            "images.tsv",
            "-D",
            "data",
            "-m",
            "cyto3.onnx",
            "-o",
            "outputs",
            "--channel",
            "DAPI",
            "--channel",
            "GFP=gfp_file,gfp_dir",
            "--delimiter",
            "tab",
        ]);

        assert_eq!(config.output_dir, Some(PathBuf::from("outputs")));
        assert_eq!(
            config.channels,
            vec![
                ChannelSpec::new("DAPI"),
                ChannelSpec::with_columns("GFP", "gfp_file", "gfp_dir")
            ]
        );
        assert_eq!(config.delimiter, b'\t');
    }

    #[test]
    fn test_parse_delimiter_rejects_multichar() {
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("").is_err());
    }
}
