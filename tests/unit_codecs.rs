use anyhow::Result;
use sheet_bridge::address::CellCoord;
use sheet_bridge::codec::FileFormat;
use sheet_bridge::errors::ErrorCode;
use sheet_bridge::extract::RawValue;
use sheet_bridge::grid::{GridControl, MemoryGrid};
use sheet_bridge::interchange::{ExportOptions, ImportOptions, SnapshotMode};
use sheet_bridge::model::CellRecord;
use std::sync::Arc;

mod support;

async fn seeded_grid() -> Result<Arc<MemoryGrid>> {
    let grid = Arc::new(MemoryGrid::with_sheets(&["Prices"]));
    grid.update_range(
        None,
        CellCoord::ORIGIN,
        vec![
            vec![support::text("item"), support::text("price")],
            vec![support::text("tea | green"), support::num(3.5)],
            vec![support::text("<b>"), CellRecord::formula("B2*2")],
        ],
    )
    .await?;
    Ok(grid)
}

#[tokio::test(flavor = "current_thread")]
async fn markdown_table_escapes_pipes() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let bench = workspace.bench(seeded_grid().await?);

    bench
        .export(&workspace.path("prices.md"), ExportOptions::new(FileFormat::Markdown))
        .await?;

    let text = workspace.read("prices.md");
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("| item | price |"));
    assert!(text.contains("tea \\| green"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn formulas_export_with_a_leading_equals_sign() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let bench = workspace.bench(seeded_grid().await?);

    let options = ExportOptions {
        include_formulas: true,
        ..ExportOptions::new(FileFormat::Tsv)
    };
    bench.export(&workspace.path("prices.tsv"), options).await?;

    assert!(workspace.read("prices.tsv").contains("<b>\t=B2*2"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn xlsx_round_trip_keeps_sheets_and_formulas() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let source = workspace.bench(seeded_grid().await?);
    source
        .export(&workspace.path("book.xlsx"), ExportOptions::lossless(FileFormat::Xlsx))
        .await?;

    let grid = Arc::new(MemoryGrid::new());
    let target = workspace.bench(grid.clone());
    let options = ImportOptions {
        snapshot_mode: SnapshotMode::Replace,
        ..ImportOptions::default()
    };
    let result = target.import(&workspace.path("book.xlsx"), options).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.sheet_names, vec!["Prices".to_string()]);
    let sheet = grid.sheet_snapshot("Prices").expect("sheet loaded");
    assert_eq!(
        sheet.cell(CellCoord::new(1, 1)).map(|c| c.value.clone()),
        Some(RawValue::Number(3.5))
    );
    let formula = sheet
        .cell(CellCoord::new(2, 1))
        .and_then(|c| c.formula.clone())
        .expect("formula kept");
    assert!(formula.trim_start_matches('=').eq_ignore_ascii_case("B2*2"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn legacy_encoded_text_is_decoded() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let path = workspace.path("latin.csv");
    std::fs::write(&path, b"caf\xe9,1\n")?;
    let grid = Arc::new(MemoryGrid::with_sheets(&["Sheet1"]));
    let bench = workspace.bench(grid.clone());

    let result = bench
        .import(&path, ImportOptions::default().into_range("A1"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        support::cell_value(&grid, "Sheet1", 0, 0),
        Some(RawValue::Text("café".to_string()))
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn parquet_round_trip_keeps_typed_columns() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let source = Arc::new(MemoryGrid::with_sheets(&["Scores"]));
    source
        .update_range(
            None,
            CellCoord::ORIGIN,
            vec![
                vec![support::text("name"), support::text("score"), support::text("passed")],
                vec![support::text("ada"), support::num(9.5), CellRecord::value(RawValue::Bool(true))],
                vec![support::text("bob"), CellRecord::default(), CellRecord::value(RawValue::Bool(false))],
            ],
        )
        .await?;
    workspace
        .bench(source)
        .export(&workspace.path("scores.parquet"), ExportOptions::new(FileFormat::Parquet))
        .await?;

    let grid = Arc::new(MemoryGrid::new());
    let result = workspace
        .bench(grid.clone())
        .import(&workspace.path("scores.parquet"), ImportOptions::default())
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.sheet_names, vec!["scores".to_string()]);
    assert_eq!(
        support::cell_value(&grid, "scores", 0, 1),
        Some(RawValue::Text("score".to_string()))
    );
    assert_eq!(support::cell_value(&grid, "scores", 1, 1), Some(RawValue::Number(9.5)));
    assert_eq!(support::cell_value(&grid, "scores", 2, 2), Some(RawValue::Bool(false)));
    assert!(
        support::cell_value(&grid, "scores", 2, 1)
            .unwrap_or_default()
            .is_null()
    );
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn export_only_formats_refuse_import() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let path = workspace.write("notes.md", "| a |\n| --- |\n| 1 |\n");
    let bench = workspace.bench(Arc::new(MemoryGrid::with_sheets(&["Sheet1"])));

    let result = bench.import(&path, ImportOptions::default()).await;
    assert_eq!(result.error_code(), Some(ErrorCode::UnsupportedFormat));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn xlsx_export_replaces_the_target_without_leftovers() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let bench = workspace.bench(seeded_grid().await?);
    let path = workspace.write("book.xlsx", "stale");

    bench
        .export(&path, ExportOptions::lossless(FileFormat::Xlsx))
        .await?;
    bench
        .export(&path, ExportOptions::lossless(FileFormat::Xlsx))
        .await?;

    let entries: Vec<String> = std::fs::read_dir(workspace.root())?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(entries, vec!["book.xlsx".to_string()]);
    assert!(std::fs::read(&path)?.starts_with(b"PK"));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn oversized_files_are_refused() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let path = workspace.write("big.csv", &"1,2,3\n".repeat(50));
    let config = workspace.config_with(|cfg| cfg.max_import_bytes = Some(64));
    let bench = sheet_bridge::state::Workbench::new(
        config,
        Arc::new(MemoryGrid::with_sheets(&["Sheet1"])),
    );

    let result = bench.import(&path, ImportOptions::default()).await;
    assert_eq!(result.error_code(), Some(ErrorCode::InvalidOptions));
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn numeric_projection_skips_text_cells() -> Result<()> {
    let workspace = support::TestWorkspace::new();
    let path = workspace.write("series.csv", "t,v,label\n0,1.5,a\n1,oops,b\n2,2.5,c\n");
    let bench = workspace.bench(Arc::new(MemoryGrid::new()));

    let options = ImportOptions {
        header_row: true,
        ..ImportOptions::default()
    };
    let imported = bench.import_numeric(&path, options).await?;

    let names: Vec<&str> = imported.series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["t", "v"]);
    assert_eq!(imported.series[1].values, vec![1.5, 2.5]);
    assert!(imported.skipped >= 1);
    Ok(())
}
