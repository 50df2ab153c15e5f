use crate::model::{ImportBatch, ImportStats};
use crate::traits::{ImportError, LabeledImageImporter};
use tracing::{info, instrument};

/// Runs importers on the blocking pool so async callers are not stalled by
/// directory scans and image header reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportExecutor;

impl ImportExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Sets up `importer` and collects every sample, stopping at the first error.
    #[instrument(skip(self, importer))]
    pub async fn execute<I>(&self, mut importer: I) -> Result<ImportBatch, ImportError>
    where
        I: LabeledImageImporter + 'static,
    {
        tokio::task::spawn_blocking(move || -> Result<ImportBatch, ImportError> {
            importer.setup()?;
            info!("Starting import of {} samples", importer.len());

            let mut stats = ImportStats::default();
            let mut samples = Vec::with_capacity(importer.len());
            for sample in importer.samples()? {
                let sample = sample?;
                stats.record(&sample);
                samples.push(sample);
            }

            info!(
                labeled = stats.labeled,
                unlabeled = stats.unlabeled,
                polylines = stats.polylines,
                "Finished import"
            );
            Ok(ImportBatch { samples, stats })
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dota::{DotaDetectionDatasetImporter, ImporterOptions};
    use std::fs;

    #[tokio::test]
    async fn test_execute_collects_batch() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("images")).unwrap();
        fs::create_dir_all(tmp.path().join("labelTxt")).unwrap();
        for stem in ["P0000", "P0001"] {
            image::RgbImage::new(10, 10)
                .save(tmp.path().join(format!("images/{stem}.png")))
                .unwrap();
        }
        fs::write(
            tmp.path().join("labelTxt/P0000.txt"),
            "imagesource:GoogleEarth\ngsd:0.1\n0 0 5 0 5 5 0 5 ship 0\n0 0 1 0 1 1 0 1 ship 1\n",
        )
        .unwrap();

        let importer = DotaDetectionDatasetImporter::new(
            ImporterOptions::new(tmp.path()).with_include_all_data(true),
        )
        .unwrap();
        let batch = ImportExecutor::new().execute(importer).await.unwrap();

        assert_eq!(batch.samples.len(), 2);
        assert_eq!(batch.stats.labeled, 1);
        assert_eq!(batch.stats.unlabeled, 1);
        assert_eq!(batch.stats.polylines, 2);
        assert_eq!(batch.stats.difficult, 1);
        assert_eq!(batch.stats.per_class.get("ship"), Some(&2));
    }

    #[tokio::test]
    async fn test_execute_stops_at_missing_image() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("labelTxt")).unwrap();
        fs::write(tmp.path().join("labelTxt/P0042.txt"), "a\nb\n").unwrap();

        let importer = DotaDetectionDatasetImporter::new(ImporterOptions::new(tmp.path())).unwrap();
        let err = ImportExecutor::new().execute(importer).await.unwrap_err();

        assert!(matches!(err, ImportError::MissingImage(ref uuid) if uuid == "P0042"));
    }
}
