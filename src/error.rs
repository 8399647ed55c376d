//! Error type shared by every fallible entry point of the engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FogError {
    /// Non-finite coordinate or zero-length wall.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Negative or NaN vision radius.
    #[error("invalid vision radius {0}")]
    InvalidRadius(f64),

    #[error("unknown observer `{0}`")]
    UnknownObserver(String),

    #[error("unknown portal `{0}`")]
    UnknownPortal(String),

    /// Two walls, portals or observers share an id.
    #[error("duplicate id `{0}`")]
    DuplicateId(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
