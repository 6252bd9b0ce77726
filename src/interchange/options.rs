use crate::codec::FileFormat;
use crate::errors::BridgeError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    /// Used range of the selected sheet.
    #[default]
    Sheet,
    /// Used range, same resolution as `sheet`.
    All,
    /// Caller-supplied A1 range.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TargetMode {
    #[default]
    NewSheet,
    CurrentRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    Replace,
    #[default]
    Append,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Crlf,
    Lf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Crlf => "\r\n",
            LineEnding::Lf => "\n",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum JsonLayout {
    /// Array of row arrays.
    #[default]
    Array,
    /// Header name to column array.
    Object,
    /// One object per data row.
    Records,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub format: FileFormat,
    pub range_mode: RangeMode,
    pub custom_range: Option<String>,
    /// Sheet id or name; defaults to the active sheet.
    pub sheet: Option<String>,
    pub delimiter: Option<String>,
    pub line_ending: LineEnding,
    pub include_headers: bool,
    pub include_formulas: bool,
    pub include_formatting: bool,
    pub include_metadata: bool,
    pub json_layout: JsonLayout,
    pub pretty: bool,
    /// Page title for HTML, caption for TeX.
    pub title: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: FileFormat::Csv,
            range_mode: RangeMode::Sheet,
            custom_range: None,
            sheet: None,
            delimiter: None,
            line_ending: LineEnding::Crlf,
            include_headers: true,
            include_formulas: false,
            include_formatting: false,
            include_metadata: false,
            json_layout: JsonLayout::Array,
            pretty: true,
            title: None,
        }
    }
}

impl ExportOptions {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Options that keep formulas, styles and custom payloads.
    pub fn lossless(format: FileFormat) -> Self {
        Self {
            format,
            include_formulas: true,
            include_formatting: true,
            include_metadata: true,
            ..Self::default()
        }
    }

    pub fn with_custom_range(mut self, range: impl Into<String>) -> Self {
        self.range_mode = RangeMode::Custom;
        self.custom_range = Some(range.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    /// Inferred from the file extension when absent.
    pub format: Option<FileFormat>,
    pub target: TargetMode,
    /// Explicit target for `currentRange`; the grid selection is used otherwise.
    pub target_range: Option<String>,
    /// Destination sheet id or name for `currentRange`; the active sheet otherwise.
    pub sheet: Option<String>,
    /// Name for the created sheet in `newSheet` mode.
    pub sheet_name: Option<String>,
    /// Which imported table to place when the file yields several.
    pub source_sheet: Option<String>,
    pub skip_rows: usize,
    pub delimiter: Option<String>,
    pub encoding: Option<String>,
    pub snapshot_mode: SnapshotMode,
    /// Treat the first row as column names (numeric projection, JSON records).
    pub header_row: bool,
}

impl ImportOptions {
    pub fn new(format: FileFormat) -> Self {
        Self {
            format: Some(format),
            ..Self::default()
        }
    }

    pub fn into_range(mut self, range: impl Into<String>) -> Self {
        self.target = TargetMode::CurrentRange;
        self.target_range = Some(range.into());
        self
    }
}

/// Single-byte delimiter from an option string, or `fallback`.
pub fn delimiter_byte(delimiter: Option<&str>, fallback: u8) -> Result<u8, BridgeError> {
    match delimiter {
        None | Some("") => Ok(fallback),
        Some("\\t") | Some("tab") => Ok(b'\t'),
        Some(value) if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        Some(value) => Err(BridgeError::InvalidOptions(format!(
            "delimiter must be a single ASCII character, got '{value}'"
        ))),
    }
}
