//! Per-observer polygon cache.
//!
//! Each cached polygon remembers the blocking-model version, position
//! and radius it was built from. `rebuild` only recomputes observers
//! for which one of those changed, so dragging a token rebuilds that
//! token alone while a door toggle rebuilds everyone.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocking::BlockingModel;
use crate::config::FogConfig;
use crate::error::FogError;
use crate::geometry::Point;
use crate::visibility::{build_validated, Observer, Occluders, VisBuffers, VisibilityPolygon};

/// What a `rebuild` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStats {
    pub rebuilt: usize,
    pub reused: usize,
    /// Cached observers that were absent from the call.
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// `None` after `invalidate`.
    model_version: Option<u64>,
    position: Point,
    vision_radius: f64,
    /// Index into `VisibilityService::polygons`.
    slot: usize,
}

impl CacheEntry {
    fn is_fresh(&self, observer: &Observer, model_version: u64) -> bool {
        self.model_version == Some(model_version)
            && self.position == observer.position
            && self.vision_radius == observer.vision_radius
    }
}

pub struct VisibilityService {
    config: FogConfig,
    bufs: VisBuffers,
    /// In the order observers were passed to the last rebuild.
    polygons: Vec<VisibilityPolygon>,
    entries: HashMap<String, CacheEntry>,
}

impl VisibilityService {
    pub fn new(config: FogConfig) -> Self {
        Self {
            config,
            bufs: VisBuffers::new(),
            polygons: Vec::new(),
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FogConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Bring the cache in line with `observers` and the model.
    ///
    /// All observers are validated before anything is touched, so a
    /// rejected call leaves the previous polygons in place.
    pub fn rebuild(
        &mut self,
        observers: &[Observer],
        model: &BlockingModel,
    ) -> Result<RebuildStats, FogError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(observers.len());
        for observer in observers {
            observer.validate()?;
            if !ids.insert(observer.token_id.as_str()) {
                return Err(FogError::DuplicateId(observer.token_id.clone()));
            }
        }

        let version = model.version();
        let mut old_polygons: Vec<Option<VisibilityPolygon>> =
            std::mem::take(&mut self.polygons).into_iter().map(Some).collect();
        let mut old_entries = std::mem::take(&mut self.entries);

        let mut polygons: Vec<Option<VisibilityPolygon>> = Vec::with_capacity(observers.len());
        let mut stale: Vec<usize> = Vec::new();
        for (i, observer) in observers.iter().enumerate() {
            let cached = old_entries
                .remove(&observer.token_id)
                .filter(|e| e.is_fresh(observer, version))
                .and_then(|e| old_polygons[e.slot].take());
            if cached.is_none() {
                stale.push(i);
            }
            polygons.push(cached);
        }

        let occluders = Occluders::of(model);
        if self.config.parallel && stale.len() > 1 {
            let config = &self.config;
            let built: Vec<(usize, VisibilityPolygon)> = stale
                .par_iter()
                .map_init(VisBuffers::new, |bufs, &i| {
                    (i, build_validated(&observers[i], occluders, config, bufs))
                })
                .collect();
            for (i, polygon) in built {
                polygons[i] = Some(polygon);
            }
        } else {
            for &i in &stale {
                polygons[i] = Some(build_validated(
                    &observers[i],
                    occluders,
                    &self.config,
                    &mut self.bufs,
                ));
            }
        }

        self.polygons = polygons.into_iter().flatten().collect();
        debug_assert_eq!(self.polygons.len(), observers.len());
        self.entries = observers
            .iter()
            .enumerate()
            .map(|(slot, o)| {
                (
                    o.token_id.clone(),
                    CacheEntry {
                        model_version: Some(version),
                        position: o.position,
                        vision_radius: o.vision_radius,
                        slot,
                    },
                )
            })
            .collect();

        let stats = RebuildStats {
            rebuilt: stale.len(),
            reused: observers.len() - stale.len(),
            dropped: old_entries.len(),
        };
        debug!(
            rebuilt = stats.rebuilt,
            reused = stats.reused,
            dropped = stats.dropped,
            model_version = version,
            "visibility rebuilt"
        );
        Ok(stats)
    }

    /// Force every observer to rebuild on the next call. Cached polygons
    /// stay queryable until then.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.model_version = None;
        }
    }

    pub fn visible_polygons(&self) -> &[VisibilityPolygon] {
        &self.polygons
    }

    pub fn polygon_for(&self, token_id: &str) -> Result<&VisibilityPolygon, FogError> {
        self.entries
            .get(token_id)
            .map(|e| &self.polygons[e.slot])
            .ok_or_else(|| FogError::UnknownObserver(token_id.to_string()))
    }

    pub fn is_point_visible_to_any(&self, p: Point) -> bool {
        self.polygons.iter().any(|poly| poly.contains(p))
    }

    pub fn is_point_visible_to(&self, token_id: &str, p: Point) -> Result<bool, FogError> {
        Ok(self.polygon_for(token_id)?.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WallRecord;
    use proptest::prelude::*;
    use std::f64::consts::TAU;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// Two rooms joined by a door at x = 100.
    fn make_two_rooms() -> BlockingModel {
        BlockingModel::new(&[
            WallRecord::wall("south", p(0.0, 0.0), p(200.0, 0.0)),
            WallRecord::wall("east", p(200.0, 0.0), p(200.0, 100.0)),
            WallRecord::wall("north", p(200.0, 100.0), p(0.0, 100.0)),
            WallRecord::wall("west", p(0.0, 100.0), p(0.0, 0.0)),
            WallRecord::wall("mid_low", p(100.0, 0.0), p(100.0, 40.0)),
            WallRecord::portal("door", p(100.0, 40.0), p(100.0, 60.0), false),
            WallRecord::wall("mid_high", p(100.0, 60.0), p(100.0, 100.0)),
        ])
        .unwrap()
    }

    fn make_party() -> Vec<Observer> {
        vec![
            Observer::new("fighter", p(20.0, 50.0), 1000.0),
            Observer::new("wizard", p(50.0, 20.0), 1000.0),
            Observer::new("rogue", p(80.0, 80.0), 1000.0),
        ]
    }

    #[test]
    fn first_rebuild_builds_everyone() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let stats = svc.rebuild(&make_party(), &make_two_rooms()).unwrap();
        assert_eq!(stats, RebuildStats { rebuilt: 3, reused: 0, dropped: 0 });
        assert_eq!(svc.len(), 3);
        assert_eq!(svc.visible_polygons()[1].token_id, "wizard");
    }

    #[test]
    fn unchanged_rebuild_reuses_everyone() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        svc.rebuild(&make_party(), &model).unwrap();
        let stats = svc.rebuild(&make_party(), &model).unwrap();
        assert_eq!(stats, RebuildStats { rebuilt: 0, reused: 3, dropped: 0 });
    }

    #[test]
    fn moving_one_token_rebuilds_only_it() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        let mut party = make_party();
        svc.rebuild(&party, &model).unwrap();
        let before: Vec<VisibilityPolygon> = svc.visible_polygons().to_vec();

        party[1].position = p(60.0, 30.0);
        let stats = svc.rebuild(&party, &model).unwrap();
        assert_eq!(stats.rebuilt, 1);
        assert_eq!(stats.reused, 2);
        assert_eq!(svc.visible_polygons()[0], before[0]);
        assert_eq!(svc.visible_polygons()[2], before[2]);
    }

    #[test]
    fn radius_change_rebuilds_only_that_token() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        let mut party = make_party();
        svc.rebuild(&party, &model).unwrap();
        party[0].vision_radius = 30.0;
        assert_eq!(svc.rebuild(&party, &model).unwrap().rebuilt, 1);
    }

    #[test]
    fn door_toggle_rebuilds_everyone_and_reveals_next_room() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let mut model = make_two_rooms();
        let party = make_party();
        svc.rebuild(&party, &model).unwrap();
        let next_room = p(150.0, 50.0);
        assert!(!svc.is_point_visible_to_any(next_room));

        model.set_portal_open("door", true).unwrap();
        let stats = svc.rebuild(&party, &model).unwrap();
        assert_eq!(stats.rebuilt, 3);
        assert!(svc.is_point_visible_to("fighter", next_room).unwrap());
    }

    #[test]
    fn absent_observers_are_dropped() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        let mut party = make_party();
        svc.rebuild(&party, &model).unwrap();
        party.remove(0);
        let stats = svc.rebuild(&party, &model).unwrap();
        assert_eq!(stats, RebuildStats { rebuilt: 0, reused: 2, dropped: 1 });
        assert!(matches!(svc.polygon_for("fighter"), Err(FogError::UnknownObserver(_))));
        assert_eq!(svc.polygon_for("rogue").unwrap().token_id, "rogue");
    }

    #[test]
    fn invalidate_forces_full_rebuild() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        svc.rebuild(&make_party(), &model).unwrap();
        svc.invalidate();
        assert!(svc.polygon_for("rogue").is_ok());
        assert_eq!(svc.rebuild(&make_party(), &model).unwrap().rebuilt, 3);
    }

    #[test]
    fn rejected_rebuild_keeps_previous_cache() {
        let mut svc = VisibilityService::new(FogConfig::default());
        let model = make_two_rooms();
        svc.rebuild(&make_party(), &model).unwrap();

        let mut bad = make_party();
        bad[2].vision_radius = -5.0;
        assert!(matches!(svc.rebuild(&bad, &model), Err(FogError::InvalidRadius(_))));

        let mut dup = make_party();
        dup[2].token_id = "fighter".into();
        assert!(matches!(svc.rebuild(&dup, &model), Err(FogError::DuplicateId(_))));

        assert_eq!(svc.len(), 3);
        assert_eq!(svc.rebuild(&make_party(), &model).unwrap().reused, 3);
    }

    #[test]
    fn parallel_rebuild_matches_serial() {
        let model = make_two_rooms();
        let mut serial = VisibilityService::new(FogConfig::default());
        let mut parallel = VisibilityService::new(FogConfig {
            parallel: true,
            ..FogConfig::default()
        });
        serial.rebuild(&make_party(), &model).unwrap();
        parallel.rebuild(&make_party(), &model).unwrap();
        assert_eq!(serial.visible_polygons(), parallel.visible_polygons());
    }

    #[test]
    fn unknown_observer_query_is_an_error() {
        let svc = VisibilityService::new(FogConfig::default());
        assert!(matches!(
            svc.is_point_visible_to("ghost", p(0.0, 0.0)),
            Err(FogError::UnknownObserver(_))
        ));
        assert!(!svc.is_point_visible_to_any(p(0.0, 0.0)));
    }

    fn arb_walls() -> impl Strategy<Value = Vec<WallRecord>> {
        prop::collection::vec(
            (-200.0..200.0f64, -200.0..200.0f64, 5.0..150.0f64, 0.0..TAU),
            1..12,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (x, y, len, a))| {
                    WallRecord::wall(format!("w{i}"), p(x, y), p(x + len * a.cos(), y + len * a.sin()))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn opening_a_portal_never_shrinks_visible_area(
            walls in arb_walls(),
            door in (-150.0..150.0f64, -150.0..150.0f64, 5.0..100.0f64, 0.0..TAU),
            observer in (-50.0..50.0f64, -50.0..50.0f64),
            radius in 10.0..600.0f64,
        ) {
            let (dx, dy, len, a) = door;
            let mut records = walls;
            records.push(WallRecord::portal(
                "door",
                p(dx, dy),
                p(dx + len * a.cos(), dy + len * a.sin()),
                false,
            ));
            let mut model = BlockingModel::new(&records).unwrap();
            let party = vec![Observer::new("pc", p(observer.0, observer.1), radius)];
            let mut svc = VisibilityService::new(FogConfig::default());

            svc.rebuild(&party, &model).unwrap();
            let closed = svc.polygon_for("pc").unwrap().area();
            model.set_portal_open("door", true).unwrap();
            svc.rebuild(&party, &model).unwrap();
            let open = svc.polygon_for("pc").unwrap().area();
            prop_assert!(open >= closed - 1e-2, "open {} < closed {}", open, closed);

            model.set_portal_open("door", false).unwrap();
            svc.rebuild(&party, &model).unwrap();
            let closed_again = svc.polygon_for("pc").unwrap().area();
            prop_assert!(closed_again <= open + 1e-2);
        }

        #[test]
        fn adding_an_observer_never_hides_a_point(
            walls in arb_walls(),
            first in (-100.0..100.0f64, -100.0..100.0f64),
            second in (-100.0..100.0f64, -100.0..100.0f64),
            probe in (-250.0..250.0f64, -250.0..250.0f64),
        ) {
            let model = BlockingModel::new(&walls).unwrap();
            let target = p(probe.0, probe.1);
            let one = vec![Observer::new("a", p(first.0, first.1), 300.0)];
            let mut two = one.clone();
            two.push(Observer::new("b", p(second.0, second.1), 300.0));

            let mut svc = VisibilityService::new(FogConfig::default());
            svc.rebuild(&one, &model).unwrap();
            let seen_by_one = svc.is_point_visible_to_any(target);
            svc.rebuild(&two, &model).unwrap();
            prop_assert!(!seen_by_one || svc.is_point_visible_to_any(target));
        }

        #[test]
        fn moving_one_observer_leaves_others_untouched(
            walls in arb_walls(),
            moved_to in (-100.0..100.0f64, -100.0..100.0f64),
        ) {
            let model = BlockingModel::new(&walls).unwrap();
            let mut party = vec![
                Observer::new("a", p(-30.0, -30.0), 250.0),
                Observer::new("b", p(30.0, 30.0), 250.0),
                Observer::new("c", p(0.0, 40.0), 250.0),
            ];
            let mut svc = VisibilityService::new(FogConfig::default());
            svc.rebuild(&party, &model).unwrap();
            let a = svc.polygon_for("a").unwrap().clone();
            let c = svc.polygon_for("c").unwrap().clone();

            party[1].position = p(moved_to.0, moved_to.1);
            svc.rebuild(&party, &model).unwrap();
            prop_assert_eq!(svc.polygon_for("a").unwrap(), &a);
            prop_assert_eq!(svc.polygon_for("c").unwrap(), &c);
        }
    }
}
