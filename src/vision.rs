//! Vision range resolution: creature senses + ambient light → radius.
//!
//! No geometry here. The output is a radius in map pixels, the only
//! per-observer input the polygon builder needs besides position.

use crate::config::FogConfig;
use crate::types::{AmbientLight, LightSourceRecord, ObserverRecord, VisionProfile};
use crate::visibility::Observer;

/// Effective vision radius in pixels.
///
/// Bright and dim light use the matching range from the profile. In
/// darkness the creature sees as far as the greater of its darkvision
/// and its own light: the profile's carried light and any active light
/// in `lights`. Unlimited ranges map to `config.unlimited_radius`.
pub fn resolve_radius<'a>(
    profile: &VisionProfile,
    ambient: AmbientLight,
    lights: impl IntoIterator<Item = &'a LightSourceRecord>,
    config: &FogConfig,
) -> f64 {
    let feet = match ambient {
        AmbientLight::Bright => profile.bright_ft,
        AmbientLight::Dim => profile.dim_ft,
        AmbientLight::Darkness => {
            let own_light = lights
                .into_iter()
                .filter(|l| l.active)
                .map(LightSourceRecord::total_radius_ft)
                .fold(profile.light_radius_ft, f64::max);
            Some(profile.dark_ft.max(own_light))
        }
    };
    match feet {
        None => config.unlimited_radius,
        Some(ft) => config.feet_to_pixels(ft.max(0.0)).min(config.unlimited_radius),
    }
}

/// Active lights carried by `token_id`.
pub fn carried_lights<'a>(
    token_id: &'a str,
    lights: &'a [LightSourceRecord],
) -> impl Iterator<Item = &'a LightSourceRecord> + 'a {
    lights
        .iter()
        .filter(move |l| l.active && l.carried_by.as_deref() == Some(token_id))
}

/// Turn a token record into an observer for the current lighting.
pub fn observer_from_record(
    record: &ObserverRecord,
    ambient: AmbientLight,
    lights: &[LightSourceRecord],
    config: &FogConfig,
) -> Observer {
    let radius = resolve_radius(
        &record.vision,
        ambient,
        carried_lights(&record.token_id, lights),
        config,
    );
    Observer::new(record.token_id.clone(), record.position(), radius)
}
