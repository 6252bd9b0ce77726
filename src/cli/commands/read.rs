use super::{import_options, workbench};
use crate::cli::errors::coded;
use crate::cli::{InspectArgs, NumericArgs};
use crate::codec::ImportedData;
use crate::config::BridgeConfig;
use crate::extract::{clean_rectangle, dimensions};
use crate::interchange::{ExportOptions, ImportOptions, import_format};
use anyhow::Result;
use serde_json::{Value, json};

pub async fn inspect(config: BridgeConfig, args: InspectArgs) -> Result<Value> {
    let bench = workbench(config);
    let options = import_options(&args.read);
    let format = import_format(&args.file, options.format).map_err(coded)?;
    let data = bench.read(&args.file, &options).await.map_err(coded)?;

    let kind = match &data {
        ImportedData::Workbook(_) => "workbook",
        ImportedData::Tables(_) => "tables",
    };
    let sheets: Vec<Value> = data
        .into_tables()
        .into_iter()
        .map(|(name, rows)| {
            let (rows, columns) = dimensions(&clean_rectangle(rows));
            json!({ "name": name, "rows": rows, "columns": columns })
        })
        .collect();

    Ok(json!({
        "file": args.file.display().to_string(),
        "format": format,
        "kind": kind,
        "sheetCount": sheets.len(),
        "sheets": sheets,
    }))
}

pub async fn numeric(config: BridgeConfig, args: NumericArgs) -> Result<Value> {
    let bench = workbench(config);
    let options = ImportOptions {
        source_sheet: args.sheet,
        header_row: args.header_row,
        ..import_options(&args.read)
    };
    let imported = bench
        .import_numeric(&args.file, options)
        .await
        .map_err(coded)?;
    Ok(serde_json::to_value(imported)?)
}

pub fn schema() -> Result<Value> {
    Ok(json!({
        "exportOptions": schemars::schema_for!(ExportOptions),
        "importOptions": schemars::schema_for!(ImportOptions),
    }))
}
