//! Append-only annotation storage injected into the engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ResourceError;
use crate::model::{Annotation, AnnotationSet};
use crate::source::ImageRef;

const SIDECAR_VERSION: u32 = 1;

/// Ordered, append-only list of annotations for one image.
///
/// `list` order is insertion order and is the render z-order.
pub trait AnnotationStore {
    fn append(&mut self, annotation: Annotation) -> Result<(), ResourceError>;

    fn list(&self) -> &[Annotation];
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    set: AnnotationSet,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(set: AnnotationSet) -> Self {
        Self { set }
    }

    pub fn snapshot(&self) -> AnnotationSet {
        self.set.clone()
    }
}

impl AnnotationStore for MemoryStore {
    fn append(&mut self, annotation: Annotation) -> Result<(), ResourceError> {
        self.set.push(annotation);
        Ok(())
    }

    fn list(&self) -> &[Annotation] {
        self.set.as_slice()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    annotation_set_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<ImageRef>,
    annotations: AnnotationSet,
}

/// JSON sidecar persistence. Every append rewrites the full set, so
/// concurrent writers resolve as last-write-wins.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    image: Option<ImageRef>,
    set: AnnotationSet,
}

impl JsonFileStore {
    /// Opens an existing sidecar, or starts an empty one that is created on
    /// the first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ResourceError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                image: None,
                set: AnnotationSet::new(),
            });
        }
        let raw = fs::read_to_string(&path).map_err(|source| ResourceError::Io {
            path: path.clone(),
            source,
        })?;
        let sidecar: Sidecar =
            serde_json::from_str(&raw).map_err(|source| ResourceError::Sidecar {
                path: path.clone(),
                source,
            })?;
        if sidecar.annotation_set_version != SIDECAR_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = sidecar.annotation_set_version,
                "unexpected annotation sidecar version"
            );
        }
        Ok(Self {
            path,
            image: sidecar.image,
            set: sidecar.annotations,
        })
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> AnnotationSet {
        self.set.clone()
    }

    /// Writes the current set to disk.
    pub fn flush(&self) -> Result<(), ResourceError> {
        let sidecar = Sidecar {
            annotation_set_version: SIDECAR_VERSION,
            image: self.image.clone(),
            annotations: self.set.clone(),
        };
        write_json_pretty(&self.path, &sidecar)?;
        tracing::info!(
            path = %self.path.display(),
            count = self.set.len(),
            "annotation set written"
        );
        Ok(())
    }
}

impl AnnotationStore for JsonFileStore {
    fn append(&mut self, annotation: Annotation) -> Result<(), ResourceError> {
        self.set.push(annotation);
        if let Err(err) = self.flush() {
            let mut items = std::mem::take(&mut self.set).into_vec();
            items.pop();
            self.set = items.into();
            return Err(err);
        }
        Ok(())
    }

    fn list(&self) -> &[Annotation] {
        self.set.as_slice()
    }
}

/// Pretty-printed JSON write, creating parent directories as needed.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), ResourceError> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value).map_err(|source| ResourceError::Sidecar {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, raw).map_err(|source| ResourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), ResourceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ResourceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ImageSize, Point};
    use crate::model::Geometry;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use tempfile::tempdir;

    fn stroke(id: &str) -> Annotation {
        Annotation {
            id: id.to_string(),
            geometry: Geometry::Stroke(vec![Point::new(1.0, 1.0)]),
            color: "#FF0000".to_string(),
            created_by: "demo".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn memory_store_lists_in_insertion_order() {
        let mut store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store.append(stroke(id)).unwrap();
        }
        let ids: Vec<&str> = store.list().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn memory_store_keeps_duplicate_ids() {
        let mut store = MemoryStore::new();
        store.append(stroke("same")).unwrap();
        store.append(stroke("same")).unwrap();
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases").join("fundus.annotations.json");
        let image = ImageRef::new("fundus.png", ImageSize::new(400, 300));

        let mut store = JsonFileStore::open(&path).unwrap().with_image(image.clone());
        assert!(!path.exists());
        store.append(stroke("one")).unwrap();
        store.append(stroke("two")).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.image(), Some(&image));
        assert_eq!(reopened.snapshot(), store.snapshot());
    }

    #[test]
    fn failed_write_leaves_set_unchanged() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "plain file").unwrap();

        let mut store = JsonFileStore::open(blocker.join("set.json")).unwrap();
        assert_matches!(store.append(stroke("lost")), Err(ResourceError::Io { .. }));
        assert!(store.list().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn writes_json_pretty_into_new_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &serde_json::json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn corrupt_sidecar_is_resource_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert_matches!(
            JsonFileStore::open(&path),
            Err(ResourceError::Sidecar { .. })
        );
    }
}
