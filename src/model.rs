use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A closed polygon label with normalized `[0, 1]` coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub label: String,
    /// One entry per shape; DOTA rows always produce a single four-point shape.
    pub points: Vec<Vec<(f64, f64)>>,
    pub closed: bool,
    pub filled: bool,
    /// `None` when the row carried no difficulty column.
    pub difficult: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polylines {
    pub polylines: Vec<Polyline>,
}

impl Polylines {
    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }
}

/// Header-level facts about an image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_channels: Option<u8>,
}

impl ImageMetadata {
    /// `(width, height)` used to normalize pixel coordinates.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A single imported sample. `labels` is `None` for unlabeled images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub image_path: PathBuf,
    pub metadata: ImageMetadata,
    pub labels: Option<Polylines>,
}

/// The label type an importer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    Polylines,
}

/// Dataset split served by the download helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" | "validation" => Ok(Split::Val),
            "test" => Ok(Split::Test),
            other => Err(format!(
                "unknown split '{}', expected one of: train, val, test",
                other
            )),
        }
    }
}

/// Summary returned once a split has been placed on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub num_samples: usize,
    pub classes: Vec<String>,
}

/// Every sample of an importer, collected in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub samples: Vec<Sample>,
    pub stats: ImportStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub labeled: usize,
    pub unlabeled: usize,
    pub polylines: usize,
    pub difficult: usize,
    pub per_class: BTreeMap<String, usize>,
}

impl ImportStats {
    pub fn record(&mut self, sample: &Sample) {
        match &sample.labels {
            Some(labels) => {
                self.labeled += 1;
                self.polylines += labels.len();
                for polyline in &labels.polylines {
                    *self.per_class.entry(polyline.label.clone()).or_insert(0) += 1;
                    if polyline.difficult == Some(true) {
                        self.difficult += 1;
                    }
                }
            }
            None => self.unlabeled += 1,
        }
    }
}
