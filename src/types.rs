//! Records exchanged with the map, token and light collaborators.
//!
//! Every struct here derives Serialize + Deserialize so it can
//! round-trip through the JSON boundary in `lib.rs`.

use serde::{Deserialize, Serialize};

use crate::config::FogConfig;
use crate::geometry::Point;
use crate::visibility::VisibilityPolygon;

// -- Map geometry --------------------------------------------------

/// One wall or portal as extracted from the map file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallRecord {
    pub id: String,
    pub a: Point,
    pub b: Point,
    #[serde(default)]
    pub is_portal: bool,
    /// Ignored for plain walls.
    #[serde(default)]
    pub is_open: bool,
}

impl WallRecord {
    pub fn wall(id: impl Into<String>, a: Point, b: Point) -> Self {
        Self {
            id: id.into(),
            a,
            b,
            is_portal: false,
            is_open: false,
        }
    }

    pub fn portal(id: impl Into<String>, a: Point, b: Point, is_open: bool) -> Self {
        Self {
            id: id.into(),
            a,
            b,
            is_portal: true,
            is_open,
        }
    }
}

// -- Lighting ------------------------------------------------------

/// Map-wide ambient light bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbientLight {
    #[default]
    Bright,
    Dim,
    #[serde(alias = "dark")]
    Darkness,
}

impl AmbientLight {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbientLight::Bright => "bright",
            AmbientLight::Dim => "dim",
            AmbientLight::Darkness => "darkness",
        }
    }

    /// Lenient parse: unknown strings fall back to bright.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dim" => AmbientLight::Dim,
            "darkness" | "dark" => AmbientLight::Darkness,
            _ => AmbientLight::Bright,
        }
    }
}

/// A placed or carried light source. Radii are in feet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightSourceRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub bright_radius_ft: f64,
    pub dim_radius_ft: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Token carrying this light, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried_by: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Common light source radii in feet (bright, dim).
pub mod presets {
    pub const TORCH: (f64, f64) = (20.0, 40.0);
    pub const LANTERN: (f64, f64) = (30.0, 60.0);
    pub const CANDLE: (f64, f64) = (5.0, 10.0);
    pub const LIGHT_SPELL: (f64, f64) = (20.0, 40.0);
    pub const DAYLIGHT: (f64, f64) = (60.0, 120.0);
}

impl LightSourceRecord {
    pub fn new(id: impl Into<String>, x: f64, y: f64, (bright, dim): (f64, f64)) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            bright_radius_ft: bright,
            dim_radius_ft: dim,
            active: true,
            carried_by: None,
        }
    }

    pub fn carried_by(mut self, token_id: impl Into<String>) -> Self {
        self.carried_by = Some(token_id.into());
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Dim light extends beyond bright, so dim is the full reach.
    pub fn total_radius_ft(&self) -> f64 {
        self.dim_radius_ft.max(self.bright_radius_ft)
    }
}

// -- Tokens --------------------------------------------------------

/// Vision ranges of one creature, in feet.
///
/// `None` for bright or dim means the creature's sight is not limited
/// by distance in that light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionProfile {
    #[serde(default)]
    pub bright_ft: Option<f64>,
    #[serde(default)]
    pub dim_ft: Option<f64>,
    /// Darkvision range; 0 when the creature has none.
    #[serde(default)]
    pub dark_ft: f64,
    /// Radius of light the creature carries itself.
    #[serde(default)]
    pub light_radius_ft: f64,
}

impl Default for VisionProfile {
    fn default() -> Self {
        Self {
            bright_ft: None,
            dim_ft: None,
            dark_ft: 0.0,
            light_radius_ft: 0.0,
        }
    }
}

/// A token as supplied by the session collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverRecord {
    pub token_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub vision: VisionProfile,
    #[serde(default)]
    pub is_player_controlled: bool,
}

impl ObserverRecord {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

// -- Fog interchange -----------------------------------------------

/// Whose eyes a fog computation is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FogMode {
    /// Player-controlled tokens only; their polygons form the shared fog.
    #[default]
    Party,
    /// Every token gets its own polygon for GM inspection; never shown
    /// to players.
    Inspect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FogParams {
    #[serde(default)]
    pub walls: Vec<WallRecord>,
    #[serde(default)]
    pub observers: Vec<ObserverRecord>,
    #[serde(default)]
    pub ambient_light: AmbientLight,
    #[serde(default)]
    pub light_sources: Vec<LightSourceRecord>,
    #[serde(default)]
    pub mode: FogMode,
    #[serde(default)]
    pub config: FogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FogReport {
    pub mode: FogMode,
    pub polygons: Vec<VisibilityPolygon>,
    pub visible_tokens: Vec<String>,
    pub discovered_lights: Vec<String>,
}
