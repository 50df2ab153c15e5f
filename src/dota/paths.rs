//! Locating media and label files for an import.
//!
//! Both maps are keyed by *stem*: the path relative to the scanned root,
//! `/`-separated, with its final extension removed (`sub/P0000.png` becomes
//! `sub/P0000`). Hidden files and directories are skipped.

use crate::traits::ImportError;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Default media location inside a dataset directory.
pub const DEFAULT_DATA_PATH: &str = "images/";

/// Default label location inside a dataset directory.
pub const DEFAULT_LABELS_PATH: &str = "labelTxt/";

/// Where the media of an import lives.
#[derive(Debug, Clone, PartialEq)]
pub enum DataPath {
    /// A directory scanned recursively.
    Dir(PathBuf),
    /// A JSON object mapping filenames to file paths.
    Manifest(PathBuf),
    /// An explicit filename → path mapping.
    Map(HashMap<String, PathBuf>),
}

fn join_onto(dataset_dir: Option<&Path>, path: &Path) -> PathBuf {
    match dataset_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Resolves the media location from the importer inputs.
///
/// Returns `None` when neither a dataset directory nor a data path is given.
pub fn resolve_data_path(
    dataset_dir: Option<&Path>,
    data_path: Option<DataPath>,
    default: &str,
) -> Option<DataPath> {
    let candidate = match data_path {
        Some(DataPath::Map(map)) => return Some(DataPath::Map(map)),
        Some(DataPath::Dir(path)) | Some(DataPath::Manifest(path)) => join_onto(dataset_dir, &path),
        None => dataset_dir?.join(default),
    };

    if !candidate.exists() {
        let manifest = json_sibling(&candidate);
        if manifest.is_file() {
            debug!(manifest = %manifest.display(), "Using data manifest");
            return Some(DataPath::Manifest(manifest));
        }
    }

    if candidate.extension().map(|ext| ext == "json").unwrap_or(false) {
        Some(DataPath::Manifest(candidate))
    } else {
        Some(DataPath::Dir(candidate))
    }
}

/// `images/` → `images.json`.
fn json_sibling(path: &Path) -> PathBuf {
    let trimmed = path
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .to_string();
    PathBuf::from(format!("{}.json", trimmed))
}

/// Resolves the label directory from the importer inputs.
pub fn resolve_labels_path(
    dataset_dir: Option<&Path>,
    labels_path: Option<&Path>,
    default: &str,
) -> Option<PathBuf> {
    match labels_path {
        Some(path) => Some(join_onto(dataset_dir, path)),
        None => dataset_dir.map(|dir| dir.join(default)),
    }
}

/// Converts a root-relative path into its stem key.
pub fn stem_key(relative: &Path) -> String {
    let stripped = relative.with_extension("");
    stripped
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// Lists the non-hidden files under `root` as `stem → path`.
///
/// Entries are visited in file-name order. When several files share a stem
/// (`P0000.jpg` and `P0000.png`) the first one is kept and the rest are
/// logged and ignored.
pub fn list_files_by_stem(root: &Path) -> Result<HashMap<String, PathBuf>, ImportError> {
    let mut map: HashMap<String, PathBuf> = HashMap::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(|e| {
            ImportError::IoError(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        match map.entry(stem_key(relative)) {
            Entry::Occupied(existing) => {
                warn!(
                    stem = %existing.key(),
                    kept = %existing.get().display(),
                    ignored = %entry.path().display(),
                    "Multiple files share a stem"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(entry.path().to_path_buf());
            }
        }
    }

    Ok(map)
}

/// Builds the `stem → image path` map for a resolved data path.
pub fn load_data_map(data_path: &DataPath) -> Result<HashMap<String, PathBuf>, ImportError> {
    match data_path {
        DataPath::Map(map) => Ok(map
            .iter()
            .map(|(name, path)| (stem_key(Path::new(name)), path.clone()))
            .collect()),
        DataPath::Manifest(path) => {
            let raw: HashMap<String, PathBuf> = serde_json::from_str(&fs::read_to_string(path)?)?;
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            Ok(raw
                .into_iter()
                .map(|(name, file)| (stem_key(Path::new(&name)), join_onto(Some(base), &file)))
                .collect())
        }
        DataPath::Dir(dir) if dir.is_dir() => list_files_by_stem(dir),
        DataPath::Dir(dir) => {
            warn!(path = %dir.display(), "Data directory not found; no images will be loaded");
            Ok(HashMap::new())
        }
    }
}

/// Builds the `stem → label path` map; empty when the directory is absent.
pub fn load_labels_map(labels_dir: Option<&Path>) -> Result<HashMap<String, PathBuf>, ImportError> {
    match labels_dir {
        Some(dir) if dir.is_dir() => list_files_by_stem(dir),
        _ => Ok(HashMap::new()),
    }
}
