//! Fog-of-war line-of-sight engine.
//!
//! Builds per-token visibility polygons against map walls and doors,
//! caches them between calls, and answers point-visibility queries.
//! The JSON entry point `compute_fog_json` accepts a `FogParams`
//! document and returns a `FogReport` document.

pub mod blocking;
pub mod config;
pub mod error;
pub mod fog;
pub mod geometry;
pub mod service;
pub mod types;
pub mod visibility;
pub mod vision;

pub use blocking::BlockingModel;
pub use config::FogConfig;
pub use error::FogError;
pub use fog::{compute_report, compute_visibility, FogEngine, FogResult};
pub use geometry::{Point, Segment};
pub use service::{RebuildStats, VisibilityService};
pub use types::{
    AmbientLight, FogMode, FogParams, FogReport, LightSourceRecord, ObserverRecord, VisionProfile,
    WallRecord,
};
pub use visibility::{Observer, Occluders, VisibilityBuilder, VisibilityPolygon};

/// Run one fog computation.
///
/// Takes a JSON string matching `FogParams` and returns a JSON string
/// matching `FogReport`.
pub fn compute_fog_json(params_json: &str) -> Result<String, FogError> {
    let params: FogParams = serde_json::from_str(params_json)?;
    let report = compute_report(&params)?;
    Ok(serde_json::to_string(&report)?)
}
