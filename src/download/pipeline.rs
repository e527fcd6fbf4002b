//! Per-entry download pipeline.
//!
//! One call to [`DownloadPipeline::run`] takes a catalog entry from backend
//! selection to a published, hashed file recorded in the catalog, reporting
//! every step as an [`EntryUpdate`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{ErrorInfo, PipelineError};
use super::filename::{filename_from_url, is_safe_subdir, preview_filename, sanitize_filename};
use super::hashing::hash_file;
use super::settings::DownloadSettings;
use super::state::{EntryStatus, EntryUpdate};
use crate::backend::{
    BackendRegistry, TransferBackend, TransferOutcome, TransferProgress, TransferRequest,
    progress_channel,
};
use crate::catalog::{CatalogEntry, CatalogStore};

/// Permissions of published files: owner read/write, everyone read.
#[cfg(unix)]
const PUBLISHED_FILE_MODE: u32 = 0o644;

/// Receives updates for the entry being processed.
pub type UpdateSink<'a> = &'a (dyn Fn(EntryUpdate) + Send + Sync);

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Downloaded, hashed and persisted.
    Completed,
    /// Destination already existed; nothing was transferred.
    Exists,
    /// Cancellation was observed; status left for the orchestrator.
    Cancelled,
    /// The entry failed.
    Failed(ErrorInfo),
}

enum Step {
    Completed,
    Exists,
    Cancelled,
}

/// Runs the download steps for single entries.
pub struct DownloadPipeline {
    registry: Arc<BackendRegistry>,
    catalog: Arc<dyn CatalogStore>,
    settings: DownloadSettings,
}

impl std::fmt::Debug for DownloadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadPipeline")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DownloadPipeline {
    /// Creates a pipeline over a registry and catalog.
    #[must_use]
    pub fn new(
        registry: Arc<BackendRegistry>,
        catalog: Arc<dyn CatalogStore>,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            registry,
            catalog,
            settings,
        }
    }

    /// Processes `entry`, writing results back into it and the catalog.
    ///
    /// Errors never escape: they are reported through `sink` as an `Error`
    /// update and returned as [`EntryOutcome::Failed`].
    #[instrument(skip(self, entry, cancel, sink), fields(id = ?entry.id, name = %entry.name))]
    pub async fn run(
        &self,
        entry: &mut CatalogEntry,
        cancel: &CancellationToken,
        sink: UpdateSink<'_>,
    ) -> EntryOutcome {
        sink(EntryUpdate::status(EntryStatus::InProgress));

        match self.try_run(entry, cancel, sink).await {
            Ok(Step::Completed) => {
                sink(EntryUpdate::status(EntryStatus::Completed));
                EntryOutcome::Completed
            }
            Ok(Step::Exists) => {
                sink(EntryUpdate::status(EntryStatus::Exists));
                EntryOutcome::Exists
            }
            Ok(Step::Cancelled) => {
                debug!("entry cancelled");
                EntryOutcome::Cancelled
            }
            Err(error) => {
                warn!(error = %error, "entry failed");
                let info = ErrorInfo::from(&error);
                sink(EntryUpdate::failed(info.clone()));
                EntryOutcome::Failed(info)
            }
        }
    }

    async fn try_run(
        &self,
        entry: &mut CatalogEntry,
        cancel: &CancellationToken,
        sink: UpdateSink<'_>,
    ) -> Result<Step, PipelineError> {
        let backend = self.registry.select(&entry.download_url)?;

        if cancel.is_cancelled() {
            return Ok(Step::Cancelled);
        }
        let filename = resolve_filename(entry, backend.as_ref()).await?;
        sink(EntryUpdate {
            filename: Some(filename.clone()),
            ..EntryUpdate::default()
        });

        if cancel.is_cancelled() {
            return Ok(Step::Cancelled);
        }
        let directory = self.destination_dir(entry)?;
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| PipelineError::io(&directory, e))?;
        let destination = directory.join(&filename);
        sink(EntryUpdate {
            destination: Some(destination.clone()),
            ..EntryUpdate::default()
        });

        if path_exists(&destination).await {
            info!(path = %destination.display(), "destination already exists");
            return Ok(Step::Exists);
        }

        if cancel.is_cancelled() {
            return Ok(Step::Cancelled);
        }
        let on_progress = |p: TransferProgress| sink(EntryUpdate::progress(p));
        let outcome = fetch_to_path(
            backend.as_ref(),
            &entry.download_url,
            &destination,
            &entry.name,
            cancel,
            &on_progress,
        )
        .await?;
        if outcome == TransferOutcome::Cancelled {
            return Ok(Step::Cancelled);
        }

        // The file is published; finish recording it even if a stop arrives now.
        let hashes = hash_file(&destination)
            .await
            .map_err(|e| PipelineError::io(&destination, e))?;
        entry.location = Some(destination.clone());
        entry.md5_hash = Some(hashes.md5);
        entry.sha256_hash = Some(hashes.sha256);
        if entry.id.is_some() {
            self.catalog.update(entry).await?;
        } else {
            debug!("entry has no id; skipping catalog update");
        }

        if self.settings.download_previews && !entry.preview_url.trim().is_empty() {
            if cancel.is_cancelled() {
                return Ok(Step::Cancelled);
            }
            match self
                .fetch_preview(entry, &filename, &directory, cancel, sink)
                .await
            {
                Ok(TransferOutcome::Cancelled) => return Ok(Step::Cancelled),
                Ok(TransferOutcome::Completed { .. }) => {}
                Err(error) => {
                    warn!(error = %error, "preview download failed");
                    sink(EntryUpdate {
                        preview_error: Some(ErrorInfo::from(&error)),
                        ..EntryUpdate::default()
                    });
                }
            }
        }

        Ok(Step::Completed)
    }

    fn destination_dir(&self, entry: &CatalogEntry) -> Result<PathBuf, PipelineError> {
        let base = entry
            .download_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| {
                self.settings
                    .directories
                    .for_type(entry.model_type)
                    .map(Path::to_path_buf)
            })
            .ok_or(PipelineError::DestinationUndefined {
                model_type: entry.model_type,
            })?;

        let subdir = entry.subdir.trim();
        if !is_safe_subdir(subdir) {
            return Err(PipelineError::UnsafeSubdirectory {
                subdir: entry.subdir.clone(),
            });
        }
        Ok(if subdir.is_empty() {
            base
        } else {
            base.join(subdir)
        })
    }

    async fn fetch_preview(
        &self,
        entry: &CatalogEntry,
        model_filename: &str,
        directory: &Path,
        cancel: &CancellationToken,
        sink: UpdateSink<'_>,
    ) -> Result<TransferOutcome, PipelineError> {
        let filename = preview_filename(&entry.preview_url, model_filename);
        let destination = directory.join(&filename);
        sink(EntryUpdate {
            preview_filename: Some(filename),
            preview_destination: Some(destination.clone()),
            ..EntryUpdate::default()
        });

        if path_exists(&destination).await {
            debug!(path = %destination.display(), "preview already exists");
            return Ok(TransferOutcome::Completed { bytes: 0 });
        }

        let backend = self.registry.select(&entry.preview_url)?;
        let on_progress = |p: TransferProgress| sink(EntryUpdate::preview_progress(p));
        fetch_to_path(
            backend.as_ref(),
            &entry.preview_url,
            &destination,
            &entry.name,
            cancel,
            &on_progress,
        )
        .await
    }
}

/// Filename precedence: override, URL segment with a real extension,
/// backend probe, entry identifier.
pub(crate) async fn resolve_filename(
    entry: &CatalogEntry,
    backend: &dyn TransferBackend,
) -> Result<String, PipelineError> {
    if let Some(name) = entry
        .download_filename
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return Ok(sanitize_filename(name));
    }

    if let Some(name) = filename_from_url(&entry.download_url) {
        return Ok(name);
    }

    if let Some(name) = backend
        .resolve_filename(&entry.download_url)
        .await?
        .filter(|n| !n.trim().is_empty())
    {
        return Ok(sanitize_filename(&name));
    }

    let fallback = entry
        .id
        .map_or_else(|| entry.name.clone(), |id| id.to_string());
    Ok(sanitize_filename(&fallback))
}

/// Transfers into a hidden temp file next to `destination`, then publishes it
/// with a no-clobber rename. The temp file is removed on every other path.
async fn fetch_to_path(
    backend: &dyn TransferBackend,
    url: &str,
    destination: &Path,
    label: &str,
    cancel: &CancellationToken,
    on_progress: &(dyn Fn(TransferProgress) + Send + Sync),
) -> Result<TransferOutcome, PipelineError> {
    let directory = destination.parent().unwrap_or_else(|| Path::new("."));
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".part")
        .tempfile_in(directory)
        .map_err(|e| PipelineError::io(directory, e))?;
    debug!(temp = %temp.path().display(), "transferring into temp file");

    let (sender, mut receiver) = progress_channel();
    let request = TransferRequest {
        url,
        destination: temp.path(),
        label,
        cancel,
    };
    let transfer = backend.transfer(request, sender);
    let drain = async {
        while let Some(progress) = receiver.recv().await {
            on_progress(progress);
        }
    };
    let (result, ()) = tokio::join!(transfer, drain);

    let outcome = result?;
    if outcome == TransferOutcome::Cancelled || cancel.is_cancelled() {
        return Ok(TransferOutcome::Cancelled);
    }

    temp.persist_noclobber(destination)
        .map_err(|e| PipelineError::io(destination, e.error))?;
    set_published_permissions(destination).await?;
    info!(path = %destination.display(), "file published");

    Ok(outcome)
}

#[cfg(unix)]
async fn set_published_permissions(path: &Path) -> Result<(), PipelineError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(PUBLISHED_FILE_MODE))
        .await
        .map_err(|e| PipelineError::io(path, e))
}

#[cfg(not(unix))]
async fn set_published_permissions(_path: &Path) -> Result<(), PipelineError> {
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{BackendPriority, ProgressSender, TransferError};
    use crate::catalog::ModelType;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ProbeBackend {
        probed: Option<&'static str>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl TransferBackend for ProbeBackend {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn priority(&self) -> BackendPriority {
            BackendPriority::Fallback
        }

        fn accepts(&self, _url: &str) -> bool {
            true
        }

        async fn resolve_filename(&self, _url: &str) -> Result<Option<String>, TransferError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.probed.map(ToString::to_string))
        }

        async fn transfer(
            &self,
            request: TransferRequest<'_>,
            _progress: ProgressSender,
        ) -> Result<TransferOutcome, TransferError> {
            std::fs::write(request.destination, b"payload")
                .map_err(|e| TransferError::io(request.destination, e))?;
            Ok(TransferOutcome::Completed { bytes: 7 })
        }
    }

    fn probe(probed: Option<&'static str>) -> ProbeBackend {
        ProbeBackend {
            probed,
            probes: AtomicUsize::new(0),
        }
    }

    fn entry(id: Option<i64>, url: &str) -> CatalogEntry {
        let mut entry = CatalogEntry::new("Detail Tweaker", ModelType::Lora, url);
        entry.id = id;
        entry
    }

    #[tokio::test]
    async fn test_filename_override_wins() {
        let backend = probe(Some("probed.bin"));
        let mut e = entry(Some(3), "https://example.com/from-url.bin");
        e.download_filename = Some("override.safetensors".into());
        assert_eq!(resolve_filename(&e, &backend).await.unwrap(), "override.safetensors");
        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filename_from_url_skips_probe() {
        let backend = probe(Some("probed.bin"));
        let e = entry(Some(3), "https://example.com/from-url.bin");
        assert_eq!(resolve_filename(&e, &backend).await.unwrap(), "from-url.bin");
        assert_eq!(backend.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filename_from_probe_then_identifier() {
        let backend = probe(Some("probed.bin"));
        let e = entry(Some(3), "https://civitai.com/api/download/models/3");
        assert_eq!(resolve_filename(&e, &backend).await.unwrap(), "probed.bin");

        let silent = probe(None);
        assert_eq!(resolve_filename(&e, &silent).await.unwrap(), "3");

        let unsaved = entry(None, "https://civitai.com/api/download/models/3");
        assert_eq!(resolve_filename(&unsaved, &silent).await.unwrap(), "Detail Tweaker");
    }

    #[tokio::test]
    async fn test_fetch_publishes_with_permissions_and_no_temp_left() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("m.bin");
        let cancel = CancellationToken::new();
        let outcome = fetch_to_path(
            &probe(None),
            "https://example.com/m.bin",
            &destination,
            "m",
            &cancel,
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome, TransferOutcome::Completed { bytes: 7 });
        assert_eq!(std::fs::read(&destination).unwrap(), b"payload");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&destination).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }

    #[tokio::test]
    async fn test_fetch_cancelled_before_publish_discards_temp() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("m.bin");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fetch_to_path(
            &probe(None),
            "https://example.com/m.bin",
            &destination,
            "m",
            &cancel,
            &|_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome, TransferOutcome::Cancelled);
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_destination_dir_rules() {
        let catalog: Arc<dyn CatalogStore> = Arc::new(NullCatalog);
        let mut settings = DownloadSettings::default();
        settings.directories.lora = Some(PathBuf::from("/models/Lora"));
        let pipeline = DownloadPipeline::new(Arc::new(BackendRegistry::new()), catalog, settings);

        let mut e = entry(Some(1), "https://example.com/m.bin");
        assert_eq!(pipeline.destination_dir(&e).unwrap(), PathBuf::from("/models/Lora"));

        e.subdir = "styles".into();
        assert_eq!(
            pipeline.destination_dir(&e).unwrap(),
            PathBuf::from("/models/Lora/styles")
        );

        e.download_path = Some(PathBuf::from("/custom"));
        assert_eq!(
            pipeline.destination_dir(&e).unwrap(),
            PathBuf::from("/custom/styles")
        );

        e.subdir = "../escape".into();
        assert!(matches!(
            pipeline.destination_dir(&e),
            Err(PipelineError::UnsafeSubdirectory { .. })
        ));

        let other = CatalogEntry::new("x", ModelType::Other, "https://example.com/x.bin");
        assert!(matches!(
            pipeline.destination_dir(&other),
            Err(PipelineError::DestinationUndefined {
                model_type: ModelType::Other
            })
        ));
    }

    struct NullCatalog;

    #[async_trait]
    impl CatalogStore for NullCatalog {
        async fn get_by_id(&self, _id: i64) -> crate::catalog::Result<Option<CatalogEntry>> {
            Ok(None)
        }

        async fn update(&self, _entry: &CatalogEntry) -> crate::catalog::Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _filter: &crate::catalog::RecordQuery,
        ) -> crate::catalog::Result<Vec<CatalogEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_run_reports_updates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(probe(None)));
        let mut settings = DownloadSettings::default();
        settings.directories.lora = Some(dir.path().to_path_buf());
        let pipeline = DownloadPipeline::new(Arc::new(registry), Arc::new(NullCatalog), settings);

        let updates = Mutex::new(Vec::new());
        let sink = |u: EntryUpdate| updates.lock().unwrap().push(u);
        let mut e = entry(Some(1), "https://example.com/m.bin");
        let outcome = pipeline.run(&mut e, &CancellationToken::new(), &sink).await;

        assert_eq!(outcome, EntryOutcome::Completed);
        let updates = updates.into_inner().unwrap();
        assert_eq!(updates.first().unwrap().status, Some(EntryStatus::InProgress));
        assert_eq!(updates.last().unwrap().status, Some(EntryStatus::Completed));
        assert_eq!(e.location, Some(dir.path().join("m.bin")));
        assert_eq!(e.md5_hash.as_deref().map(str::len), Some(32));
    }
}
