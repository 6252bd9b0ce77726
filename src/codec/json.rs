use super::{Codec, FileFormat, ImportedData, header_names, table_name, write_atomic};
use crate::extract::{RawValue, pad_rectangle};
use crate::interchange::{ExportOptions, ImportOptions, JsonLayout};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Json
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let document = match options.json_layout {
            JsonLayout::Array => Value::Array(
                rows.iter()
                    .map(|row| Value::Array(row.iter().map(RawValue::to_json).collect()))
                    .collect(),
            ),
            JsonLayout::Object => {
                let (headers, body) = split_headers(rows, options.include_headers);
                let mut columns = Map::new();
                for (idx, header) in headers.into_iter().enumerate() {
                    let column = body
                        .iter()
                        .map(|row| row.get(idx).map(RawValue::to_json).unwrap_or(Value::Null))
                        .collect();
                    columns.insert(header, Value::Array(column));
                }
                Value::Object(columns)
            }
            JsonLayout::Records => {
                let (headers, body) = split_headers(rows, options.include_headers);
                Value::Array(
                    body.iter()
                        .map(|row| {
                            let mut record = Map::new();
                            for (idx, header) in headers.iter().enumerate() {
                                let value = row.get(idx).map(RawValue::to_json).unwrap_or(Value::Null);
                                record.insert(header.clone(), value);
                            }
                            Value::Object(record)
                        })
                        .collect(),
                )
            }
        };

        write_atomic(path, |out| {
            if options.pretty {
                serde_json::to_writer_pretty(&mut *out, &document)?;
            } else {
                serde_json::to_writer(&mut *out, &document)?;
            }
            out.write_all(b"\n")?;
            Ok(())
        })
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportedData> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let document: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;

        let mut rows = table_from_json(&document)?;
        rows.drain(..options.skip_rows.min(rows.len()));

        let mut tables = IndexMap::new();
        tables.insert(table_name(path), pad_rectangle(rows));
        Ok(ImportedData::Tables(tables))
    }
}

/// Unique header names plus the data rows below them.
fn split_headers(
    rows: &[Vec<RawValue>],
    include_headers: bool,
) -> (Vec<String>, &[Vec<RawValue>]) {
    let mut headers = header_names(rows, include_headers);
    for idx in 0..headers.len() {
        let base = headers[idx].clone();
        let mut n = 1;
        while headers[..idx].contains(&headers[idx]) {
            n += 1;
            headers[idx] = format!("{base}_{n}");
        }
    }
    let body = if include_headers && !rows.is_empty() {
        &rows[1..]
    } else {
        rows
    };
    (headers, body)
}

/// Accepts row arrays, record objects, or a column object; the latter two gain a header row.
fn table_from_json(document: &Value) -> Result<Vec<Vec<RawValue>>> {
    match document {
        Value::Array(items) if items.iter().all(Value::is_array) => Ok(items
            .iter()
            .filter_map(Value::as_array)
            .map(|row| row.iter().map(RawValue::from_json).collect())
            .collect()),
        Value::Array(items) if items.iter().all(Value::is_object) => {
            let mut headers: Vec<String> = Vec::new();
            for item in items.iter().filter_map(Value::as_object) {
                for key in item.keys() {
                    if !headers.contains(key) {
                        headers.push(key.clone());
                    }
                }
            }
            let mut rows = vec![headers.iter().map(|h| RawValue::from(h.as_str())).collect()];
            for item in items.iter().filter_map(Value::as_object) {
                rows.push(
                    headers
                        .iter()
                        .map(|h| item.get(h).map(RawValue::from_json).unwrap_or_default())
                        .collect(),
                );
            }
            Ok(rows)
        }
        Value::Object(columns) if columns.values().all(Value::is_array) => {
            let height = columns
                .values()
                .filter_map(Value::as_array)
                .map(Vec::len)
                .max()
                .unwrap_or(0);
            let mut rows = vec![columns.keys().map(|k| RawValue::from(k.as_str())).collect()];
            for row in 0..height {
                rows.push(
                    columns
                        .values()
                        .map(|column| {
                            column
                                .get(row)
                                .map(RawValue::from_json)
                                .unwrap_or_default()
                        })
                        .collect(),
                );
            }
            Ok(rows)
        }
        _ => bail!("JSON must be an array of rows, an array of records, or an object of columns"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<Vec<RawValue>> {
        vec![
            vec![RawValue::from("x"), RawValue::from("x")],
            vec![RawValue::Number(1.0), RawValue::Bool(true)],
        ]
    }

    #[test]
    fn records_layout_dedupes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let options = ExportOptions {
            json_layout: JsonLayout::Records,
            pretty: false,
            ..ExportOptions::new(FileFormat::Json)
        };
        JsonCodec.export_rows(&sample(), &path, &options).unwrap();
        let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, json!([{"x": 1.0, "x_2": true}]));
    }

    #[test]
    fn column_object_gains_header_row() {
        let rows = table_from_json(&json!({"a": [1, 2], "b": ["q"]})).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![RawValue::from("a"), RawValue::from("b")]);
        assert_eq!(rows[2], vec![RawValue::Number(2.0), RawValue::Null]);
        assert!(table_from_json(&json!(42)).is_err());
    }
}
