//! File format readers and writers.
//!
//! Codecs are synchronous and run on the blocking pool; the interchange pipeline owns range
//! resolution, cleaning and grid access.

mod json;
mod markup;
mod native;
mod columnar;
mod text;
mod xlsx;

pub use json::JsonCodec;
pub use markup::{HtmlCodec, MarkdownCodec, TexCodec};
pub use native::{NATIVE_MAGIC, NATIVE_VERSION, NativeCodec};
pub use columnar::ParquetCodec;
pub use text::{DelimitedCodec, decode_text, sniff_delimiter};
pub use xlsx::XlsxCodec;

use crate::errors::BridgeError;
use crate::extract::RawValue;
use crate::interchange::{ExportOptions, ImportOptions};
use crate::model::WorkbookSnapshot;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    EnumIter,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileFormat {
    Csv,
    Tsv,
    Txt,
    Json,
    Html,
    #[serde(alias = "md")]
    #[strum(to_string = "markdown", serialize = "md")]
    #[value(alias = "md")]
    Markdown,
    Tex,
    Xlsx,
    Gridbook,
    Parquet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Some(match ext.as_str() {
            "csv" => FileFormat::Csv,
            "tsv" | "tab" => FileFormat::Tsv,
            "txt" => FileFormat::Txt,
            "json" => FileFormat::Json,
            "html" | "htm" => FileFormat::Html,
            "md" | "markdown" => FileFormat::Markdown,
            "tex" | "latex" => FileFormat::Tex,
            "xlsx" | "xlsm" => FileFormat::Xlsx,
            "gridbook" => FileFormat::Gridbook,
            "parquet" => FileFormat::Parquet,
            _ => return None,
        })
    }

    /// Formats that carry the whole workbook rather than one cleaned rectangle.
    pub fn requires_snapshot(self) -> bool {
        matches!(self, FileFormat::Xlsx | FileFormat::Gridbook)
    }

    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Tsv => "tsv",
            FileFormat::Txt => "txt",
            FileFormat::Json => "json",
            FileFormat::Html => "html",
            FileFormat::Markdown => "md",
            FileFormat::Tex => "tex",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Gridbook => "gridbook",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// Decoded file contents.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportedData {
    /// Named 2-D tables, in file order.
    Tables(IndexMap<String, Vec<Vec<RawValue>>>),
    Workbook(WorkbookSnapshot),
}

impl ImportedData {
    pub fn sheet_count(&self) -> usize {
        match self {
            ImportedData::Tables(tables) => tables.len(),
            ImportedData::Workbook(snapshot) => snapshot.sheets.len(),
        }
    }

    /// Tabular view; workbooks contribute one value table per sheet.
    pub fn into_tables(self) -> IndexMap<String, Vec<Vec<RawValue>>> {
        match self {
            ImportedData::Tables(tables) => tables,
            ImportedData::Workbook(snapshot) => snapshot
                .ordered_sheets()
                .into_iter()
                .map(|sheet| (sheet.name.clone(), sheet.value_rows()))
                .collect(),
        }
    }
}

pub trait Codec: Send + Sync {
    fn format(&self) -> FileFormat;

    fn export_rows(
        &self,
        _rows: &[Vec<RawValue>],
        _path: &Path,
        _options: &ExportOptions,
    ) -> Result<()> {
        Err(BridgeError::unsupported(self.format(), "tabular export").into())
    }

    fn export_snapshot(
        &self,
        _snapshot: &WorkbookSnapshot,
        _path: &Path,
        _options: &ExportOptions,
    ) -> Result<()> {
        Err(BridgeError::unsupported(self.format(), "workbook export").into())
    }

    fn import(&self, _path: &Path, _options: &ImportOptions) -> Result<ImportedData> {
        Err(BridgeError::unsupported(self.format(), "import").into())
    }
}

#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<FileFormat, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(DelimitedCodec::new(FileFormat::Csv));
        registry.register(DelimitedCodec::new(FileFormat::Tsv));
        registry.register(DelimitedCodec::new(FileFormat::Txt));
        registry.register(JsonCodec);
        registry.register(HtmlCodec);
        registry.register(MarkdownCodec);
        registry.register(TexCodec);
        registry.register(XlsxCodec);
        registry.register(NativeCodec);
        registry.register(ParquetCodec);
        registry
    }

    pub fn register<C: Codec + 'static>(&mut self, codec: C) {
        self.codecs.insert(codec.format(), Arc::new(codec));
    }

    pub fn get(&self, format: FileFormat) -> Result<Arc<dyn Codec>, BridgeError> {
        self.codecs
            .get(&format)
            .cloned()
            .ok_or_else(|| BridgeError::unsupported(format, "this build"))
    }

    pub fn formats(&self) -> Vec<FileFormat> {
        let mut formats: Vec<_> = self.codecs.keys().copied().collect();
        formats.sort_by_key(|f| f.to_string());
        formats
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

fn temp_beside(path: &Path) -> Result<tempfile::NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temp file in {}", parent.display()))
}

/// Writes through a temp file in the destination directory, then renames into place.
pub(crate) fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut dyn Write) -> Result<()>,
) -> Result<()> {
    let mut tmp = temp_beside(path)?;
    {
        let mut writer = std::io::BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Same as [`write_atomic`] for writers that open their output by path.
pub(crate) fn write_atomic_path(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    let tmp = temp_beside(path)?;
    write(tmp.path())?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Table name derived from the file stem.
pub(crate) fn table_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::trim)
        .filter(|stem| !stem.is_empty())
        .unwrap_or("Sheet1")
        .to_string()
}

/// Header names for a table: the first row when `use_first_row`, else `Column1..N`.
pub(crate) fn header_names(rows: &[Vec<RawValue>], use_first_row: bool) -> Vec<String> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|idx| {
            let from_row = use_first_row
                .then(|| rows.first().and_then(|row| row.get(idx)))
                .flatten()
                .filter(|value| !value.is_blank())
                .map(ToString::to_string);
            from_row.unwrap_or_else(|| format!("Column{}", idx + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn formats_resolve_from_extensions_and_names() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/b.MD")),
            Some(FileFormat::Markdown)
        );
        assert_eq!(FileFormat::from_str("md").unwrap(), FileFormat::Markdown);
        assert_eq!(FileFormat::from_str("TSV").unwrap(), FileFormat::Tsv);
        assert!(FileFormat::from_path(Path::new("noext")).is_none());
        assert!(FileFormat::Gridbook.requires_snapshot());
        assert!(!FileFormat::Json.requires_snapshot());
    }

    #[test]
    fn every_format_has_a_codec() {
        use strum::IntoEnumIterator;
        let registry = CodecRegistry::with_defaults();
        for format in FileFormat::iter() {
            assert!(registry.get(format).is_ok(), "{format} missing");
        }
        assert!(CodecRegistry::empty().get(FileFormat::Parquet).is_err());
    }
}
