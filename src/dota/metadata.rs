use crate::model::ImageMetadata;
use crate::traits::ImportError;
use image::{ImageDecoder, ImageReader};
use std::fs;
use std::path::Path;

impl ImageMetadata {
    /// Reads size, format and dimensions from the image header without
    /// decoding pixel data.
    pub fn build_for(path: &Path) -> Result<Self, ImportError> {
        let size_bytes = fs::metadata(path)?.len();

        let to_metadata_err = |source: image::ImageError| ImportError::Metadata {
            path: path.to_path_buf(),
            source,
        };

        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let mime_type = reader.format().map(|format| format.to_mime_type().to_string());
        let decoder = reader.into_decoder().map_err(to_metadata_err)?;
        let (width, height) = decoder.dimensions();
        let num_channels = decoder.color_type().channel_count();

        Ok(Self {
            size_bytes,
            mime_type,
            width,
            height,
            num_channels: Some(num_channels),
        })
    }
}
