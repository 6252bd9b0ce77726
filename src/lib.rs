pub mod address;
pub mod cli;
pub mod codec;
pub mod config;
pub mod errors;
pub mod extract;
pub mod grid;
pub mod interchange;
pub mod merge;
pub mod model;
pub mod queue;
pub mod security;
pub mod state;

pub use address::{AddressLimits, CellCoord, RangeBounds};
pub use codec::{CodecRegistry, FileFormat, ImportedData};
pub use config::BridgeConfig;
pub use errors::{BridgeError, ErrorCode, Warning};
pub use grid::{GridControl, MemoryGrid, MemoryGridOptions};
pub use interchange::{ExportOptions, ExportResult, ImportOptions, ImportResult};
pub use merge::{AppendOutcome, append_workbook};
pub use model::{SheetId, WorkbookSnapshot};
pub use queue::{MutationQueue, QueueError, QueuePhase};
pub use state::Workbench;
