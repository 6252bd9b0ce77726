pub mod read;
pub mod transfer;

use crate::cli::ReadArgs;
use crate::config::BridgeConfig;
use crate::grid::MemoryGrid;
use crate::interchange::ImportOptions;
use crate::state::Workbench;
use std::sync::Arc;

fn workbench(config: BridgeConfig) -> Workbench {
    let limits = config.limits();
    let grid = MemoryGrid::with_options(crate::grid::MemoryGridOptions {
        registration_delay: None,
        limits,
    });
    Workbench::new(config, Arc::new(grid))
}

fn import_options(read: &ReadArgs) -> ImportOptions {
    ImportOptions {
        format: read.from,
        skip_rows: read.skip_rows,
        delimiter: read.input_delimiter.clone(),
        encoding: read.encoding.clone(),
        ..ImportOptions::default()
    }
}
