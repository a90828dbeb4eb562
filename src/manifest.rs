use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::warn;

use crate::channel::ChannelSpec;
use crate::errors::{CellSegError, Result};

/// Cell contents treated as a missing value, as pandas does when it reads a CSV.
const MISSING_VALUE_TOKENS: &[&str] = &[
    "", "NaN", "nan", "-nan", "-NaN", "NA", "#NA", "N/A", "n/a", "#N/A", "#N/A N/A", "<NA>",
    "null", "NULL", "None", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

/// One manifest row. Immutable after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    row: usize,
    fields: HashMap<String, String>,
}

impl ManifestRecord {
    pub fn new(row: usize, fields: HashMap<String, String>) -> Self {
        Self { row, fields }
    }

    /// 1-based data row number (the header is not counted).
    pub const fn row(&self) -> usize {
        self.row
    }

    /// Value of `column`, or `None` when the column is absent or holds a missing-value token.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|value| value.trim())
            .filter(|value| !MISSING_VALUE_TOKENS.contains(value))
    }
}

/// Ordered records of a delimited tabular file.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    headers: Vec<String>,
    records: Vec<ManifestRecord>,
}

impl Manifest {
    /// Loads a manifest from disk. A missing or unparsable file is fatal for the run.
    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).map_err(|e| CellSegError::Manifest {
            path: path.to_path_buf(),
            source: csv::Error::from(e),
        })?;

        Self::from_reader(file, delimiter).map_err(|source| CellSegError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a manifest with a header row.
    ///
    /// A row shorter than the header leaves its trailing columns missing. A row
    /// longer than the header is an error. A repeated column name keeps its first
    /// column; later copies are renamed `NAME.1`, `NAME.2`, ...
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> std::result::Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = deduplicate_headers(reader.headers()?.iter());

        let records = reader
            .records()
            .enumerate()
            .map(|(index, record)| {
                let record = record?;
                let row = index + 1;
                if record.len() > headers.len() {
                    return Err(csv::Error::from(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "row {row} has {} fields, but the header has {}",
                            record.len(),
                            headers.len()
                        ),
                    )));
                }

                let fields = headers
                    .iter()
                    .cloned()
                    .zip(record.iter().map(str::to_string))
                    .collect();
                Ok(ManifestRecord::new(row, fields))
            })
            .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

        Ok(Self { headers, records })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[ManifestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Warns about channels whose columns are not in the header and returns their names.
    ///
    /// Not fatal: every row will simply be skipped for such a channel.
    pub fn validate_channels<'a>(&self, channels: &'a [ChannelSpec]) -> Vec<&'a str> {
        channels
            .iter()
            .filter(|channel| {
                let missing: Vec<&str> = [&channel.filename_column, &channel.path_column]
                    .into_iter()
                    .filter(|column| !self.headers.contains(column))
                    .map(String::as_str)
                    .collect();

                if !missing.is_empty() {
                    warn!(
                        "Manifest has no {} column(s) for channel {}; \
                         every row will be skipped for it",
                        missing.join(", "),
                        channel.name
                    );
                }
                !missing.is_empty()
            })
            .map(|channel| channel.name.as_str())
            .collect()
    }
}

fn deduplicate_headers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for name in names {
        let mut unique = name.to_string();
        let mut copy = 0;
        while headers.contains(&unique) {
            copy += 1;
            unique = format!("{name}.{copy}");
        }
        if copy > 0 {
            warn!("Duplicate manifest column {name}; the copy is read as {unique}");
        }
        headers.push(unique);
    }
    headers
}
