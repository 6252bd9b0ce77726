pub mod commands;
pub mod errors;
pub mod output;

use crate::codec::FileFormat;
use crate::config::{BridgeConfig, ConfigArgs};
use crate::interchange::{JsonLayout, LineEnding};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sheet-bridge",
    version,
    about = "Convert, inspect and merge spreadsheet files through an in-memory grid"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, global = true, help = "Print single-line JSON")]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a file into a fresh grid and export it in another format.
    Convert(ConvertArgs),
    /// List the sheets a file decodes to, with their dimensions.
    Inspect(InspectArgs),
    /// Append every sheet of OTHER to BASE and write the merged workbook.
    Append(AppendArgs),
    /// Project a file's columns onto numeric series.
    Numeric(NumericArgs),
    /// Print the JSON schema of the import and export option records.
    Schema,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[arg(long, value_enum, help = "Input format (default: from the extension)")]
    pub from: Option<FileFormat>,

    #[arg(long, default_value_t = 0, help = "Leading rows to skip")]
    pub skip_rows: usize,

    #[arg(long, value_name = "CHAR", help = "Input delimiter for delimited text")]
    pub input_delimiter: Option<String>,

    #[arg(long, value_name = "LABEL", help = "Input text encoding (default: detect)")]
    pub encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,

    #[command(flatten)]
    pub read: ReadArgs,

    #[arg(long, value_enum, help = "Output format (default: from the extension)")]
    pub to: Option<FileFormat>,

    #[arg(long, value_name = "SHEET", help = "Sheet to read from the input")]
    pub sheet: Option<String>,

    #[arg(long, value_name = "A1", help = "Export only this range")]
    pub range: Option<String>,

    #[arg(long, value_name = "CHAR", help = "Output delimiter for delimited text")]
    pub delimiter: Option<String>,

    #[arg(long, value_enum, default_value_t = LineEnding::Crlf)]
    pub line_ending: LineEnding,

    #[arg(long, help = "Treat the first row as data, not headers")]
    pub no_headers: bool,

    #[arg(long, help = "Export formulas instead of their values")]
    pub formulas: bool,

    #[arg(long, help = "Keep style payloads (gridbook)")]
    pub formatting: bool,

    #[arg(long, help = "Keep custom cell metadata (gridbook)")]
    pub metadata: bool,

    #[arg(long, value_enum, default_value_t = JsonLayout::Array)]
    pub json_layout: JsonLayout,

    #[arg(long, help = "HTML page title or TeX caption")]
    pub title: Option<String>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    pub file: PathBuf,

    #[command(flatten)]
    pub read: ReadArgs,
}

#[derive(Debug, Args)]
pub struct AppendArgs {
    pub base: PathBuf,
    pub other: PathBuf,
    pub output: PathBuf,

    #[arg(long, value_enum, help = "Output format (default: from the extension)")]
    pub to: Option<FileFormat>,
}

#[derive(Debug, Args)]
pub struct NumericArgs {
    pub file: PathBuf,

    #[command(flatten)]
    pub read: ReadArgs,

    #[arg(long, value_name = "SHEET", help = "Sheet to read from the input")]
    pub sheet: Option<String>,

    #[arg(long, help = "Use the first row as series names")]
    pub header_row: bool,
}

pub async fn run_command(config: BridgeConfig, command: Commands) -> Result<Value> {
    match command {
        Commands::Convert(args) => commands::transfer::convert(config, args).await,
        Commands::Inspect(args) => commands::read::inspect(config, args).await,
        Commands::Append(args) => commands::transfer::append(config, args).await,
        Commands::Numeric(args) => commands::read::numeric(config, args).await,
        Commands::Schema => commands::read::schema(),
    }
}
