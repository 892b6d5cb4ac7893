use std::path::PathBuf;

/// Malformed caller or stored data. Recovered locally where possible.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("stroke {id} has no points")]
    EmptyStroke { id: String },

    #[error("text annotation {id} has an empty payload")]
    EmptyText { id: String },

    #[error("invalid color value: {0:?}")]
    InvalidColor(String),

    #[error("invalid annotation JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("annotation set must be an array or an object with an `annotations` array, got {0}")]
    SetShape(&'static str),
}

/// The base image or the persistence target could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("base image {0} is not loaded")]
    NotLoaded(String),

    #[error("failed to decode image {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("media at {0} is not a raster image")]
    NotRaster(String),

    #[error("image {url} is {actual_w}x{actual_h}, expected {expected_w}x{expected_h}")]
    SizeMismatch {
        url: String,
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("annotation sidecar {path} is malformed: {source}")]
    Sidecar {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Illegal transition requested at the state-machine boundary. The engine is
/// left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("cannot switch tool while {0}")]
    ToolSwitchWhileBusy(&'static str),

    #[error("pointer input ignored while waiting for annotation text")]
    AwaitingText,

    #[error("no text request is pending")]
    NoPendingText,

    #[error("base image is unavailable; annotation is blocked")]
    ImageUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
