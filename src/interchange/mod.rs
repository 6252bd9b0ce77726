//! Moves data between the grid and files.
//!
//! Export resolves a range, reads and cleans it, then hands the rectangle to a codec. Snapshot
//! formats skip range resolution and export the whole workbook. Import decodes a file, validates
//! range capacity before touching the grid, and writes into a new sheet or the current range.

mod export;
mod import;
mod numeric;
mod options;

pub use export::{ExportResult, export, resolve_range};
pub use import::{FileDimensions, ImportResult, RangeValidation, import, validate_range};
pub use numeric::{NumericImport, NumericSeries, import_numeric, numeric_series};
pub use options::{
    ExportOptions, ImportOptions, JsonLayout, LineEnding, RangeMode, SnapshotMode, TargetMode,
    delimiter_byte,
};

use crate::address::AddressLimits;
use crate::codec::{CodecRegistry, FileFormat, ImportedData};
use crate::errors::BridgeError;
use crate::merge::AppendOptions;
use std::path::Path;

pub const DEFAULT_MAX_IMPORT_BYTES: u64 = 100 * 1024 * 1024;

/// Limits and merge settings shared by every pipeline call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub limits: AddressLimits,
    pub append: AppendOptions,
    /// Zero disables the check.
    pub max_import_bytes: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            limits: AddressLimits::default(),
            append: AppendOptions::default(),
            max_import_bytes: DEFAULT_MAX_IMPORT_BYTES,
        }
    }
}

/// Runs a synchronous codec call on the blocking pool.
///
/// Typed errors raised inside the codec are kept; anything else is wrapped with `wrap`.
pub(crate) async fn run_codec<T, F>(
    job: F,
    wrap: fn(anyhow::Error) -> BridgeError,
) -> Result<T, BridgeError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(job).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(match err.downcast::<BridgeError>() {
            Ok(typed) => typed,
            Err(other) => wrap(other),
        }),
        Err(join) => Err(wrap(anyhow::anyhow!("codec task failed: {join}"))),
    }
}

/// Format from the options, falling back to the file extension.
pub(crate) fn import_format(path: &Path, format: Option<FileFormat>) -> Result<FileFormat, BridgeError> {
    format.or_else(|| FileFormat::from_path(path)).ok_or_else(|| {
        BridgeError::InvalidOptions(format!(
            "cannot infer a format from '{}'; pass one explicitly",
            path.display()
        ))
    })
}

/// Decodes `path` with the codec for its format, enforcing the size limit first.
pub async fn read_file(
    codecs: &CodecRegistry,
    path: &Path,
    options: &ImportOptions,
    max_import_bytes: u64,
) -> Result<ImportedData, BridgeError> {
    let format = import_format(path, options.format)?;
    let codec = codecs.get(format)?;
    let size = tokio::fs::metadata(path).await?.len();
    if max_import_bytes > 0 && size > max_import_bytes {
        return Err(BridgeError::InvalidOptions(format!(
            "{} is {size} bytes, above the import limit of {max_import_bytes} bytes",
            path.display()
        )));
    }

    let path = path.to_path_buf();
    let options = options.clone();
    run_codec(move || codec.import(&path, &options), BridgeError::Import).await
}
