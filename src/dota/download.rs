//! DOTA download pipeline.
//!
//! [`DotaDownloader`] runs the stages of a split download strictly in
//! sequence (Fetch → Extract → Move) with:
//! - Reuse of archives already present in the scratch directory
//! - Blocking extraction moved off the runtime via `spawn_blocking`
//! - Structured logging via `tracing`
//! - Removal of the default scratch directory via RAII (`Drop` on [`ScratchDir`])
//!
//! The resulting layout is:
//!
//! ```text
//! dataset_dir/
//!     images/
//!         P0000.png
//!     labelTxt/
//!         P0000.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::archive::{self, ExtractionError};
use crate::dota::paths::DEFAULT_DATA_PATH;
use crate::fetch::{partial_path, GoogleDriveFetcher};
use crate::model::{DatasetInfo, Split};
use crate::traits::{FetchError, FileFetcher};

const TRAIN_IMAGES_ZIP_IDS: &[&str] = &[
    "1BlaGYNNEKGmT6OjZjsJ8HoUYrTTmFcO2",
    "1JBWCHdyZOd9ULX0ng5C9haAt3FMPXa3v",
    "1pEmwJtugIWhiwgBqOtplNUtTG2T454zn",
];
const TRAIN_LABELS_ZIP_ID: &str = "1I-faCP-DOxf6mxcjUTc8mYVPqUgSQxx6";

const VAL_IMAGES_ZIP_IDS: &[&str] = &["1uCCCFhFQOJLfjBpcL5MC0DHJ9lgOaXWP"];
const VAL_LABELS_ZIP_ID: &str = "1FkCSOCy4ieNg1UZj1-Irfw6-Jgqa37cC";

/// DOTA object categories, in dataset order.
pub const CLASSES: [&str; 16] = [
    "plane",
    "ship",
    "storage-tank",
    "baseball-diamond",
    "tennis-court",
    "basketball-court",
    "ground-track-field",
    "harbor",
    "bridge",
    "large-vehicle",
    "small-vehicle",
    "helicopter",
    "roundabout",
    "soccer-ball-field",
    "swimming-pool",
    "container-crane",
];

const LABELS_DIR: &str = "labelTxt";
const IMAGES_DIR: &str = "images";

/// Drive file ids of the archives that make up a split.
#[derive(Debug, Clone, Copy)]
pub struct SplitSources {
    pub labels: &'static str,
    pub images: &'static [&'static str],
}

impl SplitSources {
    /// Returns `None` for splits without published labels (test).
    pub fn for_split(split: Split) -> Option<Self> {
        match split {
            Split::Train => Some(Self {
                labels: TRAIN_LABELS_ZIP_ID,
                images: TRAIN_IMAGES_ZIP_IDS,
            }),
            Split::Val => Some(Self {
                labels: VAL_LABELS_ZIP_ID,
                images: VAL_IMAGES_ZIP_IDS,
            }),
            Split::Test => None,
        }
    }
}

/// Errors that can occur while downloading a split.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The split has no downloadable archives
    #[error("Unsupported split: {0}")]
    UnsupportedSplit(Split),

    /// Fetching an archive failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Extracting or moving archive contents failed
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// A blocking stage panicked or was cancelled
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scratch directory holding downloaded archives.
///
/// Removed on drop when `cleanup_on_drop` is set. The downloader only sets
/// it for its default scratch directory, after a successful run.
#[derive(Debug)]
pub struct ScratchDir {
    pub path: PathBuf,
    pub(crate) cleanup_on_drop: bool,
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch directory"
                );
            }
        }
    }
}

/// Statistics about a download run.
#[derive(Debug, Default, Clone)]
pub struct DownloadStats {
    /// Total time spent on the whole run (milliseconds)
    pub total_duration_ms: u64,

    /// Archives fetched from the remote host
    pub archives_fetched: usize,

    /// Archives reused from the scratch directory
    pub archives_reused: usize,

    /// Bytes written by fetches
    pub bytes_fetched: u64,

    /// Files written by extraction
    pub files_extracted: usize,
}

/// Result of a download run.
#[derive(Debug)]
pub struct DownloadResult {
    pub info: DatasetInfo,
    pub stats: DownloadStats,
}

/// Downloads and lays out one DOTA split.
///
/// # Example
///
/// ```ignore
/// use dota_importer::{DotaDownloader, GoogleDriveFetcher, Split};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = DotaDownloader::new(GoogleDriveFetcher::default()).with_cleanup(true);
///     let result = downloader.download("/data/dota/train".as_ref(), Split::Train).await?;
///     println!("{} samples", result.info.num_samples);
///     Ok(())
/// }
/// ```
pub struct DotaDownloader<F: FileFetcher> {
    fetcher: F,

    /// Where archives are stored (default: `dataset_dir/scratch`)
    scratch_dir: Option<PathBuf>,

    /// Whether to delete archives once extracted
    cleanup: bool,
}

impl<F: FileFetcher> DotaDownloader<F> {
    /// Default configuration:
    /// - Scratch dir: `dataset_dir/scratch`
    /// - Cleanup: disabled
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            scratch_dir: None,
            cleanup: false,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(scratch_dir.into());
        self
    }

    /// If `true`, archives are deleted after extraction and a default scratch
    /// directory is removed at the end of the run.
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Fetches `file_id` into `dest` unless the archive already exists.
    async fn fetch_archive(
        &self,
        file_id: &str,
        dest: &Path,
        stats: &mut DownloadStats,
    ) -> Result<(), DownloadError> {
        if dest.exists() {
            info!(path = %dest.display(), "Using existing archive");
            stats.archives_reused += 1;
            return Ok(());
        }

        info!(
            path = %dest.display(),
            source = self.fetcher.source_name(),
            "Downloading archive"
        );
        // Only a complete archive may appear at `dest`; it is reused as-is.
        let part = partial_path(dest);
        match self.fetcher.fetch(file_id, &part).await {
            Ok(bytes) => {
                tokio::fs::rename(&part, dest).await?;
                stats.bytes_fetched += bytes;
                stats.archives_fetched += 1;
                Ok(())
            }
            Err(e) => {
                if part.exists() {
                    let _ = tokio::fs::remove_file(&part).await;
                }
                Err(e.into())
            }
        }
    }

    /// Extracts `zip_path` into `outdir` and merges its `content` folder into `target`.
    async fn extract_and_move(
        &self,
        zip_path: PathBuf,
        outdir: PathBuf,
        content: &'static str,
        target: PathBuf,
    ) -> Result<usize, DownloadError> {
        let delete_zip = self.cleanup;
        let written = tokio::task::spawn_blocking(move || -> Result<usize, ExtractionError> {
            let written = archive::extract_zip(&zip_path, &outdir, delete_zip)?;
            let root = archive::content_root(&outdir, content);
            archive::move_dir(&root, &target)?;
            if outdir.exists() {
                fs::remove_dir_all(&outdir)?;
            }
            Ok(written)
        })
        .await??;
        Ok(written)
    }

    /// Executes the complete download pipeline for a split.
    ///
    /// 1. Fetch the labels archive and every image archive (reusing existing ones)
    /// 2. Extract labels and move them to `dataset_dir/labelTxt`
    /// 3. Extract each image archive and merge it into `dataset_dir/images`
    /// 4. Summarize the split on disk
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on the first failing step. Nothing is rolled
    /// back; archives already fetched are reused by the next run.
    #[instrument(skip(self, dataset_dir), fields(dataset_dir = %dataset_dir.display()))]
    pub async fn download(
        &self,
        dataset_dir: &Path,
        split: Split,
    ) -> Result<DownloadResult, DownloadError> {
        let start = Instant::now();
        let mut stats = DownloadStats::default();

        let sources = SplitSources::for_split(split).ok_or(DownloadError::UnsupportedSplit(split))?;

        fs::create_dir_all(dataset_dir)?;
        let mut scratch = ScratchDir {
            path: self
                .scratch_dir
                .clone()
                .unwrap_or_else(|| dataset_dir.join("scratch")),
            cleanup_on_drop: false,
        };
        fs::create_dir_all(&scratch.path)?;

        // ====================================================================
        // Stage 1: Fetch
        // ====================================================================

        let labels_zip = scratch.path.join(format!("{}.zip", LABELS_DIR));
        self.fetch_archive(sources.labels, &labels_zip, &mut stats)
            .await?;

        let mut images_zips = Vec::with_capacity(sources.images.len());
        for (i, file_id) in sources.images.iter().enumerate() {
            let images_zip = scratch.path.join(format!("{}{}.zip", IMAGES_DIR, i));
            self.fetch_archive(file_id, &images_zip, &mut stats).await?;
            images_zips.push(images_zip);
        }

        // ====================================================================
        // Stage 2: Extract and move
        // ====================================================================

        info!("Extracting labels");
        stats.files_extracted += self
            .extract_and_move(
                labels_zip,
                scratch.path.join(LABELS_DIR),
                LABELS_DIR,
                dataset_dir.join(LABELS_DIR),
            )
            .await?;

        for (i, images_zip) in images_zips.into_iter().enumerate() {
            info!(archive = %images_zip.display(), "Extracting images");
            stats.files_extracted += self
                .extract_and_move(
                    images_zip,
                    scratch.path.join(format!("{}{}", IMAGES_DIR, i)),
                    IMAGES_DIR,
                    dataset_dir.join(IMAGES_DIR),
                )
                .await?;
        }

        // Archives stay on failure so the next run can reuse them.
        scratch.cleanup_on_drop = self.cleanup && self.scratch_dir.is_none();
        drop(scratch);

        let info = dataset_info(dataset_dir)?;
        stats.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            num_samples = info.num_samples,
            fetched = stats.archives_fetched,
            reused = stats.archives_reused,
            files = stats.files_extracted,
            duration_ms = stats.total_duration_ms,
            "Download completed"
        );

        Ok(DownloadResult { info, stats })
    }
}

/// Counts the PNG images directly under `dataset_dir/images` and returns
/// them with the DOTA class list.
pub fn dataset_info(dataset_dir: &Path) -> Result<DatasetInfo, std::io::Error> {
    let images_dir = dataset_dir.join(DEFAULT_DATA_PATH);
    let mut num_samples = 0;

    if images_dir.is_dir() {
        for entry in fs::read_dir(&images_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|ext| ext == "png").unwrap_or(false) {
                num_samples += 1;
            }
        }
    }

    Ok(DatasetInfo {
        num_samples,
        classes: CLASSES.iter().map(|c| c.to_string()).collect(),
    })
}

/// Downloads `split` into `dataset_dir` from Google Drive.
///
/// `scratch_dir` defaults to `dataset_dir/scratch`. With `cleanup`, archives
/// are deleted once extracted.
pub async fn download_dota_dataset(
    dataset_dir: &Path,
    split: Split,
    scratch_dir: Option<&Path>,
    cleanup: bool,
) -> Result<DatasetInfo, DownloadError> {
    let mut downloader = DotaDownloader::new(GoogleDriveFetcher::default()).with_cleanup(cleanup);
    if let Some(scratch_dir) = scratch_dir {
        downloader = downloader.with_scratch_dir(scratch_dir);
    }
    Ok(downloader.download(dataset_dir, split).await?.info)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Mock fetcher serving in-memory archives by file id
    struct MockFetcher {
        archives: HashMap<&'static str, Vec<(&'static str, &'static [u8])>>,
        requested: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        fn for_val() -> Self {
            let mut archives = HashMap::new();
            archives.insert(
                VAL_LABELS_ZIP_ID,
                vec![
                    ("labelTxt/P0003.txt", b"a".as_slice()),
                    ("labelTxt/P0004.txt", b"b".as_slice()),
                ],
            );
            archives.insert(
                VAL_IMAGES_ZIP_IDS[0],
                vec![
                    ("images/P0003.png", b"png".as_slice()),
                    ("images/P0004.png", b"png".as_slice()),
                ],
            );
            Self {
                archives,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FileFetcher for MockFetcher {
        fn source_name(&self) -> &str {
            "mock"
        }

        async fn fetch(&self, file_id: &str, dest: &Path) -> Result<u64, FetchError> {
            self.requested.lock().unwrap().push(file_id.to_string());
            let entries = self.archives.get(file_id).ok_or_else(|| FetchError::Status {
                status: 404,
                file_id: file_id.to_string(),
            })?;
            write_zip(dest, entries);
            Ok(fs::metadata(dest)?.len())
        }
    }

    // Writes the start of an archive, then fails like a dropped connection
    struct InterruptedFetcher;

    #[async_trait]
    impl FileFetcher for InterruptedFetcher {
        fn source_name(&self) -> &str {
            "interrupted"
        }

        async fn fetch(&self, file_id: &str, dest: &Path) -> Result<u64, FetchError> {
            fs::write(dest, b"PK\x03\x04truncated")?;
            Err(FetchError::Status {
                status: 500,
                file_id: file_id.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_interrupted_fetch_leaves_no_archive_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset_dir = tmp.path().join("val");

        let first = DotaDownloader::new(InterruptedFetcher)
            .download(&dataset_dir, Split::Val)
            .await;
        assert!(matches!(
            first,
            Err(DownloadError::Fetch(FetchError::Status { status: 500, .. }))
        ));
        assert!(!dataset_dir.join("scratch/labelTxt.zip").exists());
        assert!(!dataset_dir.join("scratch/labelTxt.zip.part").exists());

        let second = DotaDownloader::new(MockFetcher::for_val())
            .download(&dataset_dir, Split::Val)
            .await
            .unwrap();
        assert_eq!(second.stats.archives_reused, 0);
        assert_eq!(second.stats.archives_fetched, 2);
        assert!(dataset_dir.join("labelTxt/P0003.txt").is_file());
    }

    #[test]
    fn test_split_sources() {
        assert_eq!(SplitSources::for_split(Split::Train).unwrap().images.len(), 3);
        assert_eq!(SplitSources::for_split(Split::Val).unwrap().images.len(), 1);
        assert!(SplitSources::for_split(Split::Test).is_none());
    }

    #[tokio::test]
    async fn test_download_lays_out_split() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset_dir = tmp.path().join("val");

        let result = DotaDownloader::new(MockFetcher::for_val())
            .download(&dataset_dir, Split::Val)
            .await
            .unwrap();

        assert!(dataset_dir.join("labelTxt/P0003.txt").is_file());
        assert!(dataset_dir.join("labelTxt/P0004.txt").is_file());
        assert!(dataset_dir.join("images/P0003.png").is_file());
        assert_eq!(result.info.num_samples, 2);
        assert_eq!(result.info.classes.len(), 16);
        assert_eq!(result.info.classes[0], "plane");
        assert_eq!(result.stats.archives_fetched, 2);
        assert_eq!(result.stats.files_extracted, 4);

        // Without cleanup the archives stay in scratch.
        assert!(dataset_dir.join("scratch/labelTxt.zip").is_file());
        assert!(dataset_dir.join("scratch/images0.zip").is_file());
    }

    #[tokio::test]
    async fn test_download_reuses_existing_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset_dir = tmp.path().join("val");
        let fetcher = MockFetcher::for_val();

        let scratch = dataset_dir.join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        write_zip(
            &scratch.join("labelTxt.zip"),
            &[("labelTxt/P0009.txt", b"c".as_slice())],
        );

        let downloader = DotaDownloader::new(fetcher);
        let result = downloader.download(&dataset_dir, Split::Val).await.unwrap();

        assert_eq!(result.stats.archives_reused, 1);
        assert_eq!(result.stats.archives_fetched, 1);
        assert_eq!(
            *downloader.fetcher.requested.lock().unwrap(),
            vec![VAL_IMAGES_ZIP_IDS[0].to_string()]
        );
        assert!(dataset_dir.join("labelTxt/P0009.txt").is_file());
    }

    #[tokio::test]
    async fn test_download_with_cleanup_removes_scratch() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset_dir = tmp.path().join("val");

        DotaDownloader::new(MockFetcher::for_val())
            .with_cleanup(true)
            .download(&dataset_dir, Split::Val)
            .await
            .unwrap();

        assert!(!dataset_dir.join("scratch").exists());
        assert!(dataset_dir.join("images/P0004.png").is_file());
    }

    #[tokio::test]
    async fn test_custom_scratch_dir_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let dataset_dir = tmp.path().join("val");
        let scratch = tmp.path().join("downloads");

        DotaDownloader::new(MockFetcher::for_val())
            .with_scratch_dir(&scratch)
            .with_cleanup(true)
            .download(&dataset_dir, Split::Val)
            .await
            .unwrap();

        assert!(scratch.is_dir());
        assert!(!scratch.join("labelTxt.zip").exists());
        assert!(!dataset_dir.join("scratch").exists());
    }

    #[tokio::test]
    async fn test_download_rejects_test_split() {
        let tmp = tempfile::tempdir().unwrap();
        let result = DotaDownloader::new(MockFetcher::for_val())
            .download(tmp.path(), Split::Test)
            .await;

        assert!(matches!(result, Err(DownloadError::UnsupportedSplit(Split::Test))));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let result = DotaDownloader::new(MockFetcher::for_val())
            .download(&tmp.path().join("train"), Split::Train)
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::Fetch(FetchError::Status { status: 404, .. }))
        ));
    }

    #[test]
    fn test_dataset_info_counts_top_level_pngs() {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        fs::create_dir_all(images.join("nested")).unwrap();
        fs::write(images.join("P0000.png"), b"").unwrap();
        fs::write(images.join("P0001.jpg"), b"").unwrap();
        fs::write(images.join("nested/P0002.png"), b"").unwrap();

        let info = dataset_info(tmp.path()).unwrap();
        assert_eq!(info.num_samples, 1);
    }
}
