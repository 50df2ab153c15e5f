use crate::dota::annotations::load_dota_detection_annotations;
use crate::dota::paths::{
    self, DataPath, DEFAULT_DATA_PATH, DEFAULT_LABELS_PATH,
};
use crate::model::{ImageMetadata, LabelKind, Sample};
use crate::traits::{ImportError, LabeledImageImporter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Inputs of a [`DotaDetectionDatasetImporter`].
///
/// `data_path` may name a subfolder of `dataset_dir` (`"images/"`), an
/// absolute directory, a JSON manifest (`"data.json"`) mapping filenames to
/// paths, or be replaced by an explicit map via
/// [`ImporterOptions::with_data_map`]. `labels_path` names the folder of
/// label files, relative to `dataset_dir` unless absolute.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImporterOptions {
    pub dataset_dir: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    #[serde(skip)]
    pub data_map: Option<HashMap<String, PathBuf>>,
    /// Emit samples for every image, not only the labeled ones.
    pub include_all_data: bool,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub max_samples: Option<usize>,
}

impl ImporterOptions {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: Some(dataset_dir.into()),
            ..Self::default()
        }
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_data_map(mut self, map: HashMap<String, PathBuf>) -> Self {
        self.data_map = Some(map);
        self
    }

    pub fn with_labels_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.labels_path = Some(path.into());
        self
    }

    pub fn with_include_all_data(mut self, include: bool) -> Self {
        self.include_all_data = include;
        self
    }

    /// Shuffles the sample order, deterministically when `seed` is set.
    pub fn with_shuffle(mut self, seed: Option<u64>) -> Self {
        self.shuffle = true;
        self.seed = seed;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }
}

/// State built once by [`LabeledImageImporter::setup`].
#[derive(Debug)]
struct ScanState {
    image_paths: HashMap<String, PathBuf>,
    label_paths: HashMap<String, PathBuf>,
    uuids: Vec<String>,
}

/// Importer for DOTA detection datasets stored on disk.
///
/// ```text
/// dataset_dir/
///     images/
///         P0000.png
///     labelTxt/
///         P0000.txt
/// ```
///
/// Samples are keyed by filename stem. By default only images with a label
/// file are emitted; `include_all_data` adds unlabeled images.
#[derive(Debug)]
pub struct DotaDetectionDatasetImporter {
    data_path: Option<DataPath>,
    labels_path: Option<PathBuf>,
    include_all_data: bool,
    shuffle: bool,
    seed: Option<u64>,
    max_samples: Option<usize>,
    state: Option<ScanState>,
}

impl DotaDetectionDatasetImporter {
    pub fn new(options: ImporterOptions) -> Result<Self, ImportError> {
        let has_data = options.data_path.is_some() || options.data_map.is_some();
        if options.dataset_dir.is_none() && !has_data && options.labels_path.is_none() {
            return Err(ImportError::MissingInputs);
        }

        let dataset_dir = options.dataset_dir.as_deref();
        let explicit = match (options.data_map, options.data_path) {
            (Some(map), _) => Some(DataPath::Map(map)),
            (None, Some(path)) => Some(DataPath::Dir(path)),
            (None, None) => None,
        };

        Ok(Self {
            data_path: paths::resolve_data_path(dataset_dir, explicit, DEFAULT_DATA_PATH),
            labels_path: paths::resolve_labels_path(
                dataset_dir,
                options.labels_path.as_deref(),
                DEFAULT_LABELS_PATH,
            ),
            include_all_data: options.include_all_data,
            shuffle: options.shuffle,
            seed: options.seed,
            max_samples: options.max_samples,
            state: None,
        })
    }

    pub fn data_path(&self) -> Option<&DataPath> {
        self.data_path.as_ref()
    }

    pub fn labels_path(&self) -> Option<&Path> {
        self.labels_path.as_deref()
    }

    /// Counts the image files of a dataset directory laid out in the default way.
    pub fn num_samples_in(dataset_dir: &Path) -> Result<usize, ImportError> {
        let images = dataset_dir.join(DEFAULT_DATA_PATH);
        if !images.is_dir() {
            return Ok(0);
        }
        Ok(paths::list_files_by_stem(&images)?.len())
    }

    fn order(&self, keys: BTreeSet<String>) -> Vec<String> {
        let mut uuids: Vec<String> = keys.into_iter().collect();

        if self.shuffle {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            uuids.shuffle(&mut rng);
        }

        if let Some(max) = self.max_samples {
            uuids.truncate(max);
        }

        uuids
    }

    fn load_sample(state: &ScanState, uuid: &str) -> Result<Sample, ImportError> {
        let image_path = state
            .image_paths
            .get(uuid)
            .ok_or_else(|| ImportError::MissingImage(uuid.to_string()))?;

        let metadata = ImageMetadata::build_for(image_path)?;

        let labels = match state.label_paths.get(uuid) {
            Some(labels_path) => Some(load_dota_detection_annotations(
                labels_path,
                metadata.frame_size(),
            )?),
            None => None,
        };

        debug!(
            uuid,
            labeled = labels.is_some(),
            polylines = labels.as_ref().map(|l| l.len()).unwrap_or(0),
            "Loaded sample"
        );

        Ok(Sample {
            image_path: image_path.clone(),
            metadata,
            labels,
        })
    }
}

impl LabeledImageImporter for DotaDetectionDatasetImporter {
    #[instrument(skip(self))]
    fn setup(&mut self) -> Result<(), ImportError> {
        let image_paths = match &self.data_path {
            Some(data_path) => paths::load_data_map(data_path)?,
            None => HashMap::new(),
        };
        let label_paths = paths::load_labels_map(self.labels_path.as_deref())?;

        let mut keys: BTreeSet<String> = label_paths.keys().cloned().collect();
        if self.include_all_data {
            keys.extend(image_paths.keys().cloned());
        }
        let uuids = self.order(keys);

        info!(
            images = image_paths.len(),
            labels = label_paths.len(),
            samples = uuids.len(),
            "Indexed DOTA dataset"
        );

        self.state = Some(ScanState {
            image_paths,
            label_paths,
            uuids,
        });
        Ok(())
    }

    fn len(&self) -> usize {
        self.state.as_ref().map(|s| s.uuids.len()).unwrap_or(0)
    }

    fn has_dataset_info(&self) -> bool {
        false
    }

    fn has_image_metadata(&self) -> bool {
        true
    }

    fn label_kind(&self) -> LabelKind {
        LabelKind::Polylines
    }

    fn samples(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<Sample, ImportError>> + '_>, ImportError> {
        let state = self.state.as_ref().ok_or(ImportError::NotSetUp)?;
        Ok(Box::new(
            state
                .uuids
                .iter()
                .map(move |uuid| Self::load_sample(state, uuid)),
        ))
    }
}
