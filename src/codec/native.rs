//! Lossless workbook container.
//!
//! Layout: 8-byte magic, little-endian `u32` version, then a zip archive holding a single
//! `workbook.json` envelope.

use super::{Codec, FileFormat, ImportedData, write_atomic};
use crate::errors::BridgeError;
use crate::interchange::{ExportOptions, ImportOptions};
use crate::model::WorkbookSnapshot;
use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use std::path::Path;

pub const NATIVE_MAGIC: &[u8; 8] = b"GRIDBOOK";
pub const NATIVE_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;
const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;
const MAX_ENTRY_BYTES: u64 = 4 * MAX_FILE_BYTES;
const ENTRY_NAME: &str = "workbook.json";
const FORMAT_TAG: &str = "gridbook";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    created: String,
    workbook: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

impl NativeCodec {
    /// Drops payloads the caller did not ask to keep. Values and type tags always travel.
    pub fn filter(snapshot: &WorkbookSnapshot, options: &ExportOptions) -> WorkbookSnapshot {
        let mut filtered = snapshot.clone();
        if !options.include_formatting {
            filtered.styles.clear();
        }
        for sheet in filtered.sheets.values_mut() {
            for record in sheet.cell_data.values_mut().flat_map(|cols| cols.values_mut()) {
                if !options.include_formulas {
                    record.formula = None;
                }
                if !options.include_formatting {
                    record.style = None;
                }
                if !options.include_metadata {
                    record.custom = None;
                    record.extra.clear();
                }
            }
        }
        filtered
    }

    pub fn encode(snapshot: &WorkbookSnapshot) -> Result<Vec<u8>> {
        let envelope = Envelope {
            format: FORMAT_TAG.to_string(),
            version: NATIVE_VERSION,
            created: chrono::Utc::now().to_rfc3339(),
            workbook: serde_json::to_value(snapshot).context("failed to serialize workbook")?,
        };
        let json = serde_json::to_vec(&envelope)?;

        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        archive.start_file(ENTRY_NAME, options)?;
        archive.write_all(&json)?;
        let zipped = archive.finish()?.into_inner();

        let mut bytes = Vec::with_capacity(HEADER_LEN + zipped.len());
        bytes.extend_from_slice(NATIVE_MAGIC);
        bytes.extend_from_slice(&NATIVE_VERSION.to_le_bytes());
        bytes.extend_from_slice(&zipped);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<WorkbookSnapshot> {
        ensure!(
            bytes.len() >= HEADER_LEN && &bytes[..8] == NATIVE_MAGIC,
            "not a gridbook file (bad magic)"
        );
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[8..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != NATIVE_VERSION {
            bail!("unsupported gridbook version {version} (expected {NATIVE_VERSION})");
        }

        let mut archive = zip::ZipArchive::new(Cursor::new(&bytes[HEADER_LEN..]))
            .context("gridbook payload is not a valid archive")?;
        let entry = archive
            .by_name(ENTRY_NAME)
            .with_context(|| format!("gridbook archive is missing {ENTRY_NAME}"))?;
        ensure!(
            entry.size() <= MAX_ENTRY_BYTES,
            "gridbook payload expands beyond {MAX_ENTRY_BYTES} bytes"
        );
        let mut json = Vec::with_capacity(entry.size() as usize);
        entry.take(MAX_ENTRY_BYTES).read_to_end(&mut json)?;

        let envelope: Envelope = serde_json::from_slice(&json).map_err(|err| {
            BridgeError::SnapshotStructureInvalid(format!("invalid gridbook envelope: {err}"))
        })?;
        if envelope.format != FORMAT_TAG {
            return Err(BridgeError::SnapshotStructureInvalid(format!(
                "unexpected envelope format '{}'",
                envelope.format
            ))
            .into());
        }
        Ok(WorkbookSnapshot::from_value(envelope.workbook)?)
    }
}

impl Codec for NativeCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Gridbook
    }

    fn export_snapshot(
        &self,
        snapshot: &WorkbookSnapshot,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let bytes = Self::encode(&Self::filter(snapshot, options))?;
        write_atomic(path, |out| {
            out.write_all(&bytes)?;
            Ok(())
        })
    }

    fn import(&self, path: &Path, _options: &ImportOptions) -> Result<ImportedData> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();
        ensure!(
            size <= MAX_FILE_BYTES,
            "{} is {size} bytes; gridbook files are limited to {MAX_FILE_BYTES} bytes",
            path.display()
        );
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(ImportedData::Workbook(Self::decode(&bytes)?))
    }
}
