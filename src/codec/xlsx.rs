use super::{Codec, FileFormat, ImportedData};
use crate::address::{CellCoord, RangeBounds, parse_range};
use crate::errors::BridgeError;
use crate::extract::RawValue;
use crate::interchange::{ExportOptions, ImportOptions};
use crate::model::{CellRecord, SheetSnapshot, WorkbookSnapshot};
use anyhow::{Context, Result, anyhow};
use std::path::Path;

/// Office Open XML workbooks through umya-spreadsheet. Values, formulas and merges travel;
/// style payloads do not.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxCodec;

impl Codec for XlsxCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Xlsx
    }

    fn export_snapshot(
        &self,
        snapshot: &WorkbookSnapshot,
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        let sheets = snapshot.ordered_sheets();
        if sheets.is_empty() {
            return Err(BridgeError::NoDataFound("workbook has no sheets".to_string()).into());
        }

        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        for sheet in sheets {
            let worksheet = book
                .new_sheet(sheet.name.as_str())
                .map_err(|err| anyhow!("failed to add sheet '{}': {err}", sheet.name))?;
            for (&row, cols) in &sheet.cell_data {
                for (&col, record) in cols {
                    let cell = worksheet.get_cell_mut((col + 1, row + 1));
                    if options.include_formulas
                        && let Some(formula) = record.formula.as_deref()
                    {
                        cell.set_formula(formula.trim_start_matches('='));
                        cell.get_cell_value_mut()
                            .set_formula_result_default(record.value.to_string());
                        continue;
                    }
                    match &record.value {
                        RawValue::Null => {}
                        RawValue::Bool(b) => {
                            cell.set_value_bool(*b);
                        }
                        RawValue::Number(n) => {
                            cell.set_value_number(*n);
                        }
                        RawValue::Text(text) => {
                            cell.set_value(text.clone());
                        }
                    }
                }
            }
            for merge in &sheet.merge_data {
                if !merge.is_single_cell() {
                    worksheet.add_merge_cells(merge.to_string());
                }
            }
        }

        super::write_atomic_path(path, |tmp| {
            umya_spreadsheet::writer::xlsx::write(&book, tmp)
                .with_context(|| format!("failed to write workbook '{}'", path.display()))
        })
    }

    fn import(&self, path: &Path, _options: &ImportOptions) -> Result<ImportedData> {
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .with_context(|| format!("failed to read workbook '{}'", path.display()))?;

        let mut snapshot = WorkbookSnapshot::new(String::new(), super::table_name(path));
        for (idx, worksheet) in book.get_sheet_collection().iter().enumerate() {
            let mut sheet =
                SheetSnapshot::new(format!("sheet-{}", idx + 1), worksheet.get_name());
            for cell in worksheet.get_cell_collection() {
                let coordinate = cell.get_coordinate();
                let coord = CellCoord::new(
                    (*coordinate.get_row_num()).saturating_sub(1),
                    (*coordinate.get_col_num()).saturating_sub(1),
                );
                let mut record = CellRecord::value(cell_value(cell));
                if cell.is_formula() {
                    record.formula = Some(format!("={}", cell.get_formula()));
                }
                if !record.is_empty() {
                    sheet.set_cell(coord, record);
                }
            }
            sheet.merge_data = worksheet
                .get_merge_cells()
                .iter()
                .filter_map(|range| parse_range(&range.get_range()).ok())
                .collect::<Vec<RangeBounds>>();
            if let Some(extent) = sheet.extent() {
                sheet.row_count = Some(extent.end_row + 1);
                sheet.column_count = Some(extent.end_col + 1);
            }
            snapshot.push_sheet(sheet);
        }
        Ok(ImportedData::Workbook(snapshot))
    }
}

/// Numeric cells come back as numbers; everything else keeps its display text.
fn cell_value(cell: &umya_spreadsheet::Cell) -> RawValue {
    let text = cell.get_value();
    if text.is_empty() {
        return RawValue::Null;
    }
    match cell.get_value_number() {
        Some(n) if n.is_finite() => RawValue::Number(n),
        _ => RawValue::Text(text.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workbook_survives_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.xlsx");

        let mut sheet = SheetSnapshot::new("s1", "Numbers");
        sheet.set_cell(CellCoord::new(0, 0), CellRecord::value("label"));
        sheet.set_cell(CellCoord::new(1, 0), CellRecord::value(3.0));
        let mut formula = CellRecord::formula("=A2*2");
        formula.value = RawValue::Number(6.0);
        sheet.set_cell(CellCoord::new(1, 1), formula);
        sheet.merge_data.push(parse_range("C1:D2").unwrap());
        let mut book = WorkbookSnapshot::new("wb", "Book");
        book.push_sheet(sheet);

        XlsxCodec
            .export_snapshot(&book, &path, &ExportOptions::lossless(FileFormat::Xlsx))
            .unwrap();
        let imported = XlsxCodec.import(&path, &ImportOptions::default()).unwrap();
        let ImportedData::Workbook(read) = imported else {
            panic!("expected a workbook");
        };
        let sheet = read.sheet_by_name("Numbers").unwrap();
        let value_at = |row, col| sheet.cell(CellCoord::new(row, col)).unwrap().value.clone();
        assert_eq!(value_at(0, 0), RawValue::from("label"));
        assert_eq!(value_at(1, 0), RawValue::Number(3.0));
        assert_eq!(
            sheet.cell(CellCoord::new(1, 1)).unwrap().formula.as_deref(),
            Some("=A2*2")
        );
        assert_eq!(sheet.merge_data[0].to_string(), "C1:D2");
    }
}
