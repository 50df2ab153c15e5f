//! DOTA dataset support.
//!
//! - **Importer**: [`DotaDetectionDatasetImporter`] pairs images with label
//!   files by stem and yields samples with normalized polylines
//! - **Annotations**: parsing of the DOTA label text format
//! - **Download**: [`DotaDownloader`] fetches and lays out a split on disk

pub mod annotations;
pub mod download;
pub mod importer;
pub mod metadata;
pub mod paths;

// Re-export commonly used types
pub use annotations::{
    load_dota_detection_annotations, parse_row, read_annotation_file, AnnotationFile,
    AnnotationHeader, DotaRow,
};

pub use download::{
    dataset_info, download_dota_dataset, DotaDownloader, DownloadError, DownloadResult,
    DownloadStats, ScratchDir, SplitSources, CLASSES,
};

pub use importer::{DotaDetectionDatasetImporter, ImporterOptions};
pub use paths::DataPath;
