//! DOTA label text files.
//!
//! ```text
//! imagesource:GoogleEarth
//! gsd:0.146343590398
//! 2753 2408 2861 2385 2888 2468 2805 2502 plane 0
//! ```
//!
//! The first two lines are headers. Each following row holds four corner
//! points in pixels, the class name and a difficulty flag.

use crate::model::{Polyline, Polylines};
use crate::traits::ImportError;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of header lines preceding the rows.
const HEADER_LINES: usize = 2;

/// Metadata carried by the two header lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationHeader {
    pub image_source: Option<String>,
    /// Ground sample distance in metres per pixel.
    pub gsd: Option<f64>,
}

/// One annotation row in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DotaRow {
    pub points: [(f64, f64); 4],
    pub label: String,
    pub difficult: Option<bool>,
}

impl DotaRow {
    /// Converts the row into a closed polyline normalized by `(width, height)`.
    pub fn to_polyline(&self, (width, height): (u32, u32)) -> Polyline {
        let (w, h) = (width as f64, height as f64);
        Polyline {
            label: self.label.clone(),
            points: vec![self.points.iter().map(|&(x, y)| (x / w, y / h)).collect()],
            closed: true,
            filled: false,
            difficult: self.difficult,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationFile {
    pub header: AnnotationHeader,
    pub rows: Vec<DotaRow>,
}

fn parse_header_line(header: &mut AnnotationHeader, line: &str) {
    let Some((key, value)) = line.split_once(':') else {
        return;
    };
    match key.trim() {
        "imagesource" => header.image_source = Some(value.trim().to_string()),
        "gsd" => header.gsd = value.trim().parse().ok(),
        _ => {}
    }
}

/// Parses a single row. `Err` carries a human-readable reason.
pub fn parse_row(line: &str) -> Result<DotaRow, String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 9 {
        return Err(format!("expected at least 9 fields, found {}", tokens.len()));
    }

    let mut coords = [0.0f64; 8];
    for (i, token) in tokens[..8].iter().enumerate() {
        coords[i] = token
            .parse()
            .map_err(|_| format!("invalid coordinate '{}'", token))?;
    }

    let (label, difficult) = if tokens.len() >= 10 {
        let flag = tokens[tokens.len() - 1];
        let difficulty: i64 = flag
            .parse()
            .map_err(|_| format!("invalid difficulty '{}'", flag))?;
        (tokens[tokens.len() - 2], Some(difficulty != 0))
    } else {
        (tokens[8], None)
    };

    Ok(DotaRow {
        points: [
            (coords[0], coords[1]),
            (coords[2], coords[3]),
            (coords[4], coords[5]),
            (coords[6], coords[7]),
        ],
        label: label.to_string(),
        difficult,
    })
}

/// Parses the contents of a label file. `path` is only used for errors.
pub fn parse_annotations(contents: &str, path: &Path) -> Result<AnnotationFile, ImportError> {
    let mut file = AnnotationFile::default();

    for (index, line) in contents.lines().enumerate() {
        if index < HEADER_LINES {
            parse_header_line(&mut file.header, line);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let row = parse_row(line).map_err(|reason| ImportError::MalformedRow {
            path: PathBuf::from(path),
            line: index + 1,
            reason,
        })?;
        file.rows.push(row);
    }

    Ok(file)
}

pub fn read_annotation_file(path: &Path) -> Result<AnnotationFile, ImportError> {
    let contents = fs::read_to_string(path)?;
    parse_annotations(&contents, path)
}

/// Loads the polylines of a label file, normalized by the image frame size.
pub fn load_dota_detection_annotations(
    path: &Path,
    frame_size: (u32, u32),
) -> Result<Polylines, ImportError> {
    let (width, height) = frame_size;
    if width == 0 || height == 0 {
        return Err(ImportError::InvalidFrameSize { width, height });
    }

    let file = read_annotation_file(path)?;
    Ok(Polylines {
        polylines: file.rows.iter().map(|row| row.to_polyline(frame_size)).collect(),
    })
}
