//! Base image resolution.
//!
//! Fetching and caching live outside the engine; an [`ImageSource`] only has
//! to turn an [`ImageRef`] into decoded pixels.

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ResourceError;
use crate::geometry::ImageSize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Resolvable reference to the image being annotated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: MediaKind,
    pub size: ImageSize,
}

impl ImageRef {
    pub fn new(url: impl Into<String>, size: ImageSize) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Image,
            size,
        }
    }
}

pub trait ImageSource {
    fn load(&self, reference: &ImageRef) -> Result<DynamicImage, ResourceError>;
}

/// Loads references as filesystem paths, optionally relative to a root.
#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    root: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for FileImageSource {
    fn load(&self, reference: &ImageRef) -> Result<DynamicImage, ResourceError> {
        if reference.kind != MediaKind::Image {
            return Err(ResourceError::NotRaster(reference.url.clone()));
        }
        let path = self.resolve(&reference.url);
        if !path.exists() {
            return Err(ResourceError::ImageNotFound(reference.url.clone()));
        }
        let image = image::open(&path).map_err(|source| ResourceError::Decode {
            url: reference.url.clone(),
            source,
        })?;
        check_size(reference, &image)?;
        Ok(image)
    }
}

/// The declared intrinsic size must match the decoded pixels, since stored
/// geometry is expressed in that space.
pub fn check_size(reference: &ImageRef, image: &DynamicImage) -> Result<(), ResourceError> {
    let (actual_w, actual_h) = image.dimensions();
    if actual_w != reference.size.width || actual_h != reference.size.height {
        return Err(ResourceError::SizeMismatch {
            url: reference.url.clone(),
            expected_w: reference.size.width,
            expected_h: reference.size.height,
            actual_w,
            actual_h,
        });
    }
    Ok(())
}

/// Reads the intrinsic size of an image file without keeping its pixels.
pub fn probe_size(path: &Path) -> Result<ImageSize, ResourceError> {
    if !path.exists() {
        return Err(ResourceError::ImageNotFound(path.display().to_string()));
    }
    let (width, height) = image::image_dimensions(path).map_err(|source| ResourceError::Decode {
        url: path.display().to_string(),
        source,
    })?;
    Ok(ImageSize::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, w: u32, h: u32) {
        RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn loads_relative_to_root() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("fundus.png"), 40, 30);
        let source = FileImageSource::with_root(dir.path());
        let image = source
            .load(&ImageRef::new("fundus.png", ImageSize::new(40, 30)))
            .unwrap();
        assert_eq!(image.dimensions(), (40, 30));
    }

    #[test]
    fn missing_file_is_resource_error() {
        let dir = tempdir().unwrap();
        let source = FileImageSource::with_root(dir.path());
        assert_matches!(
            source.load(&ImageRef::new("nope.png", ImageSize::new(1, 1))),
            Err(ResourceError::ImageNotFound(_))
        );
    }

    #[test]
    fn video_reference_is_not_raster() {
        let mut reference = ImageRef::new("clip.mp4", ImageSize::new(1, 1));
        reference.kind = MediaKind::Video;
        assert_matches!(
            FileImageSource::new().load(&reference),
            Err(ResourceError::NotRaster(_))
        );
    }

    #[test]
    fn declared_size_must_match_pixels() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("oct.png");
        write_png(&path, 20, 10);
        assert_eq!(probe_size(&path).unwrap(), ImageSize::new(20, 10));
        let source = FileImageSource::new();
        let reference = ImageRef::new(path.display().to_string(), ImageSize::new(40, 30));
        assert_matches!(
            source.load(&reference),
            Err(ResourceError::SizeMismatch { actual_w: 20, .. })
        );
    }
}
