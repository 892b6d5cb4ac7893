//! Image annotation engine for clinical case images.
//!
//! Freehand strokes and text labels are captured from pointer input, stored
//! in image-intrinsic pixel coordinates, and replayed onto the base image to
//! produce a deterministic composite.

pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod model;
pub mod recorder;
pub mod render;
pub mod source;
pub mod store;

pub use config::EngineConfig;
pub use engine::{AnnotationEngine, Phase, TextInput, TextRequest, Transition};
pub use error::{EngineError, InputError, ResourceError, StateError};
pub use geometry::{to_image_space, ElementBounds, ImageSize, MappingMode, Point};
pub use model::{Annotation, AnnotationSet, Geometry, TextLabel, Tool};
pub use recorder::PathRecorder;
pub use render::{Composite, Renderer};
pub use source::{FileImageSource, ImageRef, ImageSource, MediaKind};
pub use store::{AnnotationStore, JsonFileStore, MemoryStore};
