//! Fog query API: the boundary the rendering layer calls.
//!
//! A `FogEngine` keeps the per-observer cache alive between calls, so
//! the caller just hands in the current tokens and blocking model each
//! time something changes and gets back the polygons to paint.

use serde::{Deserialize, Serialize};

use crate::blocking::BlockingModel;
use crate::config::FogConfig;
use crate::error::FogError;
use crate::geometry::Point;
use crate::service::{RebuildStats, VisibilityService};
use crate::types::{
    AmbientLight, FogMode, FogParams, FogReport, LightSourceRecord, ObserverRecord,
};
use crate::visibility::{Observer, VisibilityPolygon};
use crate::vision::observer_from_record;

/// Polygons for one fog computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FogResult {
    pub mode: FogMode,
    /// One per observer, in the order the observers were given.
    pub polygons: Vec<VisibilityPolygon>,
    pub stats: RebuildStats,
}

impl FogResult {
    /// Polygons that may be shown to players. Empty in inspect mode.
    pub fn player_fog(&self) -> &[VisibilityPolygon] {
        match self.mode {
            FogMode::Party => &self.polygons,
            FogMode::Inspect => &[],
        }
    }

    pub fn polygon_for(&self, token_id: &str) -> Option<&VisibilityPolygon> {
        self.polygons.iter().find(|p| p.token_id == token_id)
    }

    pub fn is_point_visible_to_any(&self, p: Point) -> bool {
        self.polygons.iter().any(|poly| poly.contains(p))
    }

    pub fn is_point_visible_to(&self, token_id: &str, p: Point) -> Result<bool, FogError> {
        self.polygon_for(token_id)
            .map(|poly| poly.contains(p))
            .ok_or_else(|| FogError::UnknownObserver(token_id.to_string()))
    }

    /// True when the player-facing fog covers `p`.
    fn party_sees(&self, p: Point) -> bool {
        self.player_fog().iter().any(|poly| poly.contains(p))
    }

    /// Ids of tokens inside the player-facing fog. Party observers
    /// always count as visible. Empty in inspect mode.
    pub fn visible_tokens(&self, tokens: &[ObserverRecord]) -> Vec<String> {
        let fog = self.player_fog();
        tokens
            .iter()
            .filter(|t| {
                fog.iter().any(|poly| poly.token_id == t.token_id) || self.party_sees(t.position())
            })
            .map(|t| t.token_id.clone())
            .collect()
    }

    /// Ids of active lights whose position lies inside the player-facing
    /// fog. Empty in inspect mode.
    pub fn discovered_lights(&self, lights: &[LightSourceRecord]) -> Vec<String> {
        lights
            .iter()
            .filter(|l| l.active && self.party_sees(l.position()))
            .map(|l| l.id.clone())
            .collect()
    }

    /// Visible area per observer, in square pixels.
    pub fn visible_areas(&self) -> Vec<(&str, f64)> {
        self.polygons
            .iter()
            .map(|p| (p.token_id.as_str(), p.area()))
            .collect()
    }
}

/// Tokens that contribute vision in `mode`, with radii resolved for
/// the current lighting. Party mode keeps player-controlled tokens only.
pub fn observers_for_mode(
    records: &[ObserverRecord],
    mode: FogMode,
    ambient: AmbientLight,
    lights: &[LightSourceRecord],
    config: &FogConfig,
) -> Vec<Observer> {
    records
        .iter()
        .filter(|r| mode == FogMode::Inspect || r.is_player_controlled)
        .map(|r| observer_from_record(r, ambient, lights, config))
        .collect()
}

pub struct FogEngine {
    service: VisibilityService,
}

impl FogEngine {
    pub fn new(config: FogConfig) -> Result<Self, FogError> {
        config.validate()?;
        Ok(Self {
            service: VisibilityService::new(config),
        })
    }

    pub fn config(&self) -> &FogConfig {
        self.service.config()
    }

    pub fn service(&self) -> &VisibilityService {
        &self.service
    }

    /// Rebuild stale polygons and snapshot the result.
    pub fn compute_visibility(
        &mut self,
        observers: &[Observer],
        model: &BlockingModel,
        mode: FogMode,
    ) -> Result<FogResult, FogError> {
        let stats = self.service.rebuild(observers, model)?;
        Ok(FogResult {
            mode,
            polygons: self.service.visible_polygons().to_vec(),
            stats,
        })
    }

    /// Same as `compute_visibility`, starting from raw token records.
    pub fn compute_from_records(
        &mut self,
        records: &[ObserverRecord],
        model: &BlockingModel,
        mode: FogMode,
        ambient: AmbientLight,
        lights: &[LightSourceRecord],
    ) -> Result<FogResult, FogError> {
        let observers = observers_for_mode(records, mode, ambient, lights, self.config());
        self.compute_visibility(&observers, model, mode)
    }
}

/// One-shot computation with the default config and no cache reuse.
pub fn compute_visibility(
    observers: &[Observer],
    model: &BlockingModel,
    mode: FogMode,
) -> Result<FogResult, FogError> {
    FogEngine::new(FogConfig::default())?.compute_visibility(observers, model, mode)
}

/// Everything `compute_fog_json` does short of the (de)serialization.
pub fn compute_report(params: &FogParams) -> Result<FogReport, FogError> {
    let model = BlockingModel::new(&params.walls)?;
    let mut engine = FogEngine::new(params.config.clone())?;
    let result = engine.compute_from_records(
        &params.observers,
        &model,
        params.mode,
        params.ambient_light,
        &params.light_sources,
    )?;
    Ok(FogReport {
        mode: result.mode,
        visible_tokens: result.visible_tokens(&params.observers),
        discovered_lights: result.discovered_lights(&params.light_sources),
        polygons: result.polygons,
    })
}
