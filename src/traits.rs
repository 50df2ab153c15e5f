use crate::model::{LabelKind, Sample};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("At least one of `dataset_dir`, `data_path`, and `labels_path` must be provided")]
    MissingInputs,
    #[error("Importer must be set up before iterating")]
    NotSetUp,
    #[error("No image found for sample '{0}'")]
    MissingImage(String),
    #[error("Malformed row at {}:{line}: {reason}", .path.display())]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("Invalid frame size {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },
    #[error("Failed to read image metadata for {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to parse data manifest: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Import task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A source of `(image path, metadata, labels)` samples.
///
/// `setup` performs the directory scans once; iteration afterwards only
/// touches the files of each emitted sample.
pub trait LabeledImageImporter: Send {
    fn setup(&mut self) -> Result<(), ImportError>;

    /// Number of samples that iteration will yield. Zero before `setup`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_dataset_info(&self) -> bool;

    fn has_image_metadata(&self) -> bool;

    fn label_kind(&self) -> LabelKind;

    fn samples(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<Sample, ImportError>> + '_>, ImportError>;
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Download of '{file_id}' failed: HTTP {status}")]
    Status { status: u16, file_id: String },
    #[error("No download confirmation token found for '{0}'")]
    ConfirmTokenMissing(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Returns the host this fetcher downloads from (e.g., "google-drive").
    fn source_name(&self) -> &str;

    /// Downloads the file identified by `file_id` to `dest`, returning the
    /// number of bytes written.
    async fn fetch(&self, file_id: &str, dest: &Path) -> Result<u64, FetchError>;
}
