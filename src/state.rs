use crate::codec::{CodecRegistry, ImportedData};
use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::grid::GridControl;
use crate::interchange::{
    self, ExportOptions, ExportResult, ImportOptions, ImportResult, NumericImport,
};
use crate::merge::{AppendOutcome, append_workbook};
use crate::model::WorkbookSnapshot;
use crate::queue::{MutationQueue, QueueHandle};
use crate::security::enforce_within_workspace;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One open grid, its mutation queue, and the codecs and limits used against it.
///
/// Every operation that writes the grid, and every export that must observe a settled grid,
/// runs through the queue.
pub struct Workbench {
    config: Arc<BridgeConfig>,
    grid: Arc<dyn GridControl>,
    queue: MutationQueue,
    codecs: Arc<CodecRegistry>,
}

impl std::fmt::Debug for Workbench {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workbench")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}

impl Workbench {
    /// Must be called inside a Tokio runtime; the queue worker is spawned here.
    pub fn new(config: BridgeConfig, grid: Arc<dyn GridControl>) -> Self {
        let queue = MutationQueue::new(config.debounce());
        Self {
            config: Arc::new(config),
            grid,
            queue,
            codecs: Arc::new(CodecRegistry::with_defaults()),
        }
    }

    pub fn with_codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn grid(&self) -> Arc<dyn GridControl> {
        self.grid.clone()
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn resolve_path(&self, path: &Path, field: &'static str) -> Result<PathBuf, BridgeError> {
        enforce_within_workspace(&self.config.workspace_root, path, field)
    }

    /// Queues an arbitrary grid mutation behind everything already submitted.
    pub fn mutate<F, Fut, T>(&self, op: F) -> QueueHandle<T>
    where
        F: FnOnce(Arc<dyn GridControl>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let grid = self.grid.clone();
        self.queue.enqueue(move || op(grid))
    }

    pub async fn export(
        &self,
        path: &Path,
        options: ExportOptions,
    ) -> Result<ExportResult, BridgeError> {
        let path = self.resolve_path(path, "output")?;
        let grid = self.grid.clone();
        let codecs = self.codecs.clone();
        let limits = self.config.limits();
        self.queue
            .enqueue(move || async move {
                Ok(interchange::export(grid.as_ref(), &codecs, &path, &options, &limits).await)
            })
            .await?
    }

    /// Never fails outright; problems are reported inside the result.
    pub async fn import(&self, path: &Path, options: ImportOptions) -> ImportResult {
        let path = match self.resolve_path(path, "input") {
            Ok(path) => path,
            Err(err) => return ImportResult::failure(&err),
        };
        let grid = self.grid.clone();
        let codecs = self.codecs.clone();
        let settings = self.config.pipeline_settings();
        let queued = self
            .queue
            .enqueue(move || async move {
                Ok(interchange::import(grid.as_ref(), &codecs, &path, &options, &settings).await)
            })
            .await;
        match queued {
            Ok(result) => result,
            Err(err) => ImportResult::failure(&BridgeError::from(err)),
        }
    }

    /// Fails only when the destination is unreadable or no sheet could be appended.
    pub async fn append_snapshot(
        &self,
        snapshot: WorkbookSnapshot,
    ) -> Result<AppendOutcome, BridgeError> {
        let grid = self.grid.clone();
        let append = self.config.pipeline_settings().append;
        let outcome = self
            .queue
            .enqueue(move || async move {
                Ok(append_workbook(grid.as_ref(), &snapshot, &append).await)
            })
            .await??;
        match outcome.total_failure() {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }

    /// Decodes a workbook file and appends its sheets.
    pub async fn append_file(
        &self,
        path: &Path,
        options: ImportOptions,
    ) -> Result<AppendOutcome, BridgeError> {
        let snapshot = match self.read(path, &options).await? {
            ImportedData::Workbook(snapshot) => snapshot,
            ImportedData::Tables(_) => {
                return Err(BridgeError::InvalidOptions(format!(
                    "'{}' is not a workbook format; append needs xlsx or gridbook",
                    path.display()
                )));
            }
        };
        self.append_snapshot(snapshot).await
    }

    /// Numeric series from a file; the grid is not involved.
    pub async fn import_numeric(
        &self,
        path: &Path,
        options: ImportOptions,
    ) -> Result<NumericImport, BridgeError> {
        let path = self.resolve_path(path, "input")?;
        interchange::import_numeric(&self.codecs, &path, &options, self.max_import_bytes()).await
    }

    /// Decodes a file without touching the grid.
    pub async fn read(
        &self,
        path: &Path,
        options: &ImportOptions,
    ) -> Result<ImportedData, BridgeError> {
        let path = self.resolve_path(path, "input")?;
        interchange::read_file(&self.codecs, &path, options, self.max_import_bytes()).await
    }

    /// Snapshot of the grid once every queued mutation has settled.
    pub async fn snapshot(&self) -> Result<WorkbookSnapshot, BridgeError> {
        self.queue.wait_for_completion().await;
        self.grid
            .get_workbook_snapshot()
            .await
            .map_err(BridgeError::Grid)
    }

    fn max_import_bytes(&self) -> u64 {
        self.config.max_import_bytes.unwrap_or(0)
    }
}
