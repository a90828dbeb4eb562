use std::fmt;
use std::str::FromStr;

/// Column prefix holding a channel's image filename, e.g. `Image_FileName_DAPI`.
pub const FILENAME_COLUMN_PREFIX: &str = "Image_FileName_";
/// Column prefix holding a channel's directory, e.g. `Image_PathName_DAPI`.
pub const PATH_COLUMN_PREFIX: &str = "Image_PathName_";

/// A named imaging channel and the manifest columns describing its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub filename_column: String,
    pub path_column: String,
}

impl ChannelSpec {
    /// Channel using the conventional `Image_FileName_<name>` / `Image_PathName_<name>` columns.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            filename_column: format!("{FILENAME_COLUMN_PREFIX}{name}"),
            path_column: format!("{PATH_COLUMN_PREFIX}{name}"),
            name,
        }
    }

    pub fn with_columns(
        name: impl Into<String>,
        filename_column: impl Into<String>,
        path_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            filename_column: filename_column.into(),
            path_column: path_column.into(),
        }
    }

    /// DAPI (nuclei) followed by Actin (cytoskeleton).
    pub fn defaults() -> Vec<Self> {
        vec![Self::new("DAPI"), Self::new("Actin")]
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let conventional = Self::new(self.name.clone());
        if conventional.filename_column == self.filename_column
            && conventional.path_column == self.path_column
        {
            write!(f, "{}", self.name)
        } else {
            write!(
                f,
                "{}={},{}",
                self.name, self.filename_column, self.path_column
            )
        }
    }
}

/// Parses either `NAME` or `NAME=FILENAME_COLUMN,PATH_COLUMN`.
impl FromStr for ChannelSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, columns) = match s.split_once('=') {
            Some((name, columns)) => (name.trim(), Some(columns)),
            None => (s, None),
        };

        if name.is_empty() {
            return Err(format!("`{s}` has an empty channel name"));
        }

        let Some(columns) = columns else {
            return Ok(Self::new(name));
        };

        match columns.split(',').map(str::trim).collect::<Vec<_>>().as_slice() {
            [filename, path] if !filename.is_empty() && !path.is_empty() => {
                Ok(Self::with_columns(name, *filename, *path))
            }
            _ => Err(format!(
                "`{s}` must look like NAME or NAME=FILENAME_COLUMN,PATH_COLUMN"
            )),
        }
    }
}
