use super::{Codec, FileFormat, ImportedData, table_name, write_atomic};
use crate::errors::BridgeError;
use crate::extract::{RawValue, pad_rectangle};
use crate::interchange::{ExportOptions, ImportOptions, LineEnding, delimiter_byte};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::path::Path;

/// Comma, tab and pipe separated text.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedCodec {
    format: FileFormat,
}

impl DelimitedCodec {
    pub fn new(format: FileFormat) -> Self {
        debug_assert!(matches!(
            format,
            FileFormat::Csv | FileFormat::Tsv | FileFormat::Txt
        ));
        Self { format }
    }

    fn default_delimiter(&self) -> u8 {
        match self.format {
            FileFormat::Tsv => b'\t',
            FileFormat::Txt => b'|',
            _ => b',',
        }
    }
}

impl Codec for DelimitedCodec {
    fn format(&self) -> FileFormat {
        self.format
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let delimiter = delimiter_byte(options.delimiter.as_deref(), self.default_delimiter())?;
        let terminator = match options.line_ending {
            LineEnding::Crlf => csv::Terminator::CRLF,
            LineEnding::Lf => csv::Terminator::Any(b'\n'),
        };
        write_atomic(path, |out| {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .terminator(terminator)
                .quote_style(csv::QuoteStyle::Necessary)
                .flexible(true)
                .from_writer(out);
            for row in rows {
                writer.write_record(row.iter().map(ToString::to_string))?;
            }
            writer.flush()?;
            Ok(())
        })
    }

    fn import(&self, path: &Path, options: &ImportOptions) -> Result<ImportedData> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let text = decode_text(&bytes, options.encoding.as_deref())?;

        let delimiter = match options.delimiter.as_deref() {
            Some(delimiter) => delimiter_byte(Some(delimiter), self.default_delimiter())?,
            None if self.format == FileFormat::Txt => sniff_delimiter(&text),
            None => self.default_delimiter(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("malformed record {} in {}", idx + 1, path.display()))?;
            if idx < options.skip_rows {
                continue;
            }
            rows.push(record.iter().map(RawValue::infer).collect::<Vec<_>>());
        }

        let mut tables = IndexMap::new();
        tables.insert(table_name(path), pad_rectangle(rows));
        Ok(ImportedData::Tables(tables))
    }
}

/// Decodes with an explicit label, else by BOM, else UTF-8 with a Windows-1252 fallback.
pub fn decode_text(bytes: &[u8], encoding: Option<&str>) -> Result<String, BridgeError> {
    if let Some(label) = encoding.map(str::trim).filter(|l| !l.is_empty()) {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
            .ok_or_else(|| BridgeError::InvalidOptions(format!("unknown encoding '{label}'")))?;
        let (text, _, _) = encoding.decode(bytes);
        return Ok(text.into_owned());
    }
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return Ok(text.into_owned());
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            Ok(text.into_owned())
        }
    }
}

/// Picks the candidate delimiter that splits the first lines most consistently.
pub fn sniff_delimiter(content: &str) -> u8 {
    const CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];
    let sample: Vec<&str> = content.lines().take(10).collect();
    if sample.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0usize;
    for delimiter in CANDIDATES {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|record| record.ok())
                    .map(|record| record.len())
                    .unwrap_or(1)
            })
            .collect();

        let first = counts[0];
        if first <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&count| count == first).count() * first;
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            vec![RawValue::from("plain"), RawValue::from("a,b")],
            vec![RawValue::from("say \"hi\""), RawValue::Number(2.0)],
            vec![RawValue::from("two\nlines"), RawValue::Null],
        ];
        DelimitedCodec::new(FileFormat::Csv)
            .export_rows(&rows, &path, &ExportOptions::new(FileFormat::Csv))
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "plain,\"a,b\"\r\n\"say \"\"hi\"\"\",2\r\n\"two\nlines\",\r\n"
        );
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a|b\n1|2\n"), b'|');
        assert_eq!(sniff_delimiter("a\tb\n1\t2\n"), b'\t');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn falls_back_to_windows_1252() {
        let bytes = b"caf\xe9";
        assert_eq!(decode_text(bytes, None).unwrap(), "caf\u{e9}");
        let bom = b"\xef\xbb\xbfx,y";
        assert_eq!(decode_text(bom, None).unwrap(), "x,y");
        assert!(decode_text(b"x", Some("klingon")).is_err());
    }
}
