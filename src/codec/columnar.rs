use super::{Codec, FileFormat, ImportedData, header_names, table_name, write_atomic_path};
use crate::errors::BridgeError;
use crate::extract::{RawValue, pad_rectangle};
use crate::interchange::{ExportOptions, ImportOptions};
use anyhow::{Context, Result};
use arrow_array::{ArrayRef, BooleanArray, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use indexmap::IndexMap;
use parquet::arrow::ArrowWriter;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field as RecordField;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Apache Parquet, one table per file. Columns holding only numbers or only booleans keep
/// their type; anything mixed is written as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Number,
    Bool,
    Text,
}

fn column_kind<'a>(values: impl Iterator<Item = &'a RawValue>) -> ColumnKind {
    let mut kind = None;
    for value in values {
        let this = match value {
            RawValue::Null => continue,
            RawValue::Number(_) => ColumnKind::Number,
            RawValue::Bool(_) => ColumnKind::Bool,
            RawValue::Text(_) => return ColumnKind::Text,
        };
        match kind {
            None => kind = Some(this),
            Some(seen) if seen != this => return ColumnKind::Text,
            Some(_) => {}
        }
    }
    kind.unwrap_or(ColumnKind::Text)
}

/// Arrow field names must be distinct for the reader to tell columns apart.
fn distinct_names(names: Vec<String>) -> Vec<String> {
    let mut taken = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 1;
            while !taken.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{name}_{n}");
            }
            candidate
        })
        .collect()
}

static MISSING: RawValue = RawValue::Null;

fn build_column(body: &[Vec<RawValue>], idx: usize) -> (DataType, ArrayRef) {
    let cells = || body.iter().map(move |row| row.get(idx).unwrap_or(&MISSING));
    match column_kind(cells()) {
        ColumnKind::Number => (
            DataType::Float64,
            Arc::new(Float64Array::from(
                cells().map(|v| v.as_number()).collect::<Vec<_>>(),
            )),
        ),
        ColumnKind::Bool => (
            DataType::Boolean,
            Arc::new(BooleanArray::from(
                cells()
                    .map(|v| match v {
                        RawValue::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            )),
        ),
        ColumnKind::Text => (
            DataType::Utf8,
            Arc::new(StringArray::from(
                cells()
                    .map(|v| (!v.is_null()).then(|| v.to_string()))
                    .collect::<Vec<_>>(),
            )),
        ),
    }
}

fn record_value(field: &RecordField) -> RawValue {
    match field {
        RecordField::Null => RawValue::Null,
        RecordField::Bool(b) => RawValue::Bool(*b),
        RecordField::Byte(n) => RawValue::Number(f64::from(*n)),
        RecordField::Short(n) => RawValue::Number(f64::from(*n)),
        RecordField::Int(n) => RawValue::Number(f64::from(*n)),
        RecordField::Long(n) => RawValue::Number(*n as f64),
        RecordField::UByte(n) => RawValue::Number(f64::from(*n)),
        RecordField::UShort(n) => RawValue::Number(f64::from(*n)),
        RecordField::UInt(n) => RawValue::Number(f64::from(*n)),
        RecordField::ULong(n) => RawValue::Number(*n as f64),
        RecordField::Float(n) => RawValue::Number(f64::from(*n)),
        RecordField::Double(n) => RawValue::Number(*n),
        RecordField::Str(text) => RawValue::Text(text.clone()),
        other => RawValue::Text(other.to_string()),
    }
}

impl Codec for ParquetCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Parquet
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let (names, body) = if options.include_headers {
            (header_names(rows, true), rows.get(1..).unwrap_or_default())
        } else {
            (header_names(rows, false), rows)
        };
        if names.is_empty() {
            return Err(BridgeError::NoDataFound("nothing to write".to_string()).into());
        }

        let (fields, columns): (Vec<Field>, Vec<ArrayRef>) = distinct_names(names)
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let (data_type, column) = build_column(body, idx);
                (Field::new(name, data_type, true), column)
            })
            .unzip();
        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("failed to assemble parquet columns")?;

        write_atomic_path(path, |tmp| {
            let file = File::create(tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            let mut writer = ArrowWriter::try_new(file, schema, None)?;
            writer.write(&batch)?;
            writer.close()?;
            Ok(())
        })
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportedData> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let reader = SerializedFileReader::new(file)
            .with_context(|| format!("{} is not a parquet file", path.display()))?;

        let header: Vec<RawValue> = reader
            .metadata()
            .file_metadata()
            .schema()
            .get_fields()
            .iter()
            .map(|field| RawValue::Text(field.name().to_string()))
            .collect();
        let mut rows = vec![header];
        for row in reader.get_row_iter(None)? {
            let row = row.with_context(|| format!("failed to read a row of {}", path.display()))?;
            rows.push(
                row.get_column_iter()
                    .map(|(_, field)| record_value(field))
                    .collect(),
            );
        }
        rows.drain(..options.skip_rows.min(rows.len()));

        tracing::debug!(path = %path.display(), rows = rows.len(), "decoded parquet table");
        let mut tables = IndexMap::new();
        tables.insert(table_name(path), pad_rectangle(rows));
        Ok(ImportedData::Tables(tables))
    }
}
