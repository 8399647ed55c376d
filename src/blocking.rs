//! Walls and portals that block line of sight.
//!
//! Walls are fixed for the lifetime of a loaded map. Portals (doors)
//! are the only mutable part: flipping one bumps `version()` so that
//! cached visibility polygons can detect staleness without hashing
//! geometry.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::FogError;
use crate::geometry::{segment_intersection, Point, Segment};
use crate::types::WallRecord;

/// Crossings this close to an endpoint of either segment are ordinary
/// junctions and already sampled as endpoints.
const JUNCTION_TOL_SQ: f64 = 1e-12;

#[derive(Debug, Clone)]
struct Portal {
    id: String,
    /// Index into `BlockingModel::segments`.
    segment: usize,
    is_open: bool,
}

#[derive(Debug, Clone)]
pub struct BlockingModel {
    /// Every wall and portal, in record order.
    segments: Vec<Segment>,
    /// Portal slot for each entry of `segments`, `None` for plain walls.
    portal_slot: Vec<Option<usize>>,
    portals: Vec<Portal>,
    portal_index: HashMap<String, usize>,
    /// Points where two segments cross away from their endpoints.
    /// Portals are included whatever their state.
    crossings: Vec<Point>,
    version: u64,
    /// Walls plus closed portals; rebuilt lazily after a portal change.
    effective: OnceCell<Vec<Segment>>,
    /// Open portals; rebuilt lazily after a portal change.
    open: OnceCell<Vec<Segment>>,
}

impl BlockingModel {
    /// Build the model from raw map records.
    ///
    /// Rejects non-finite coordinates, zero-length segments and
    /// duplicate ids. Collinear walls are kept as given.
    pub fn new(records: &[WallRecord]) -> Result<Self, FogError> {
        let mut segments = Vec::with_capacity(records.len());
        let mut portal_slot = Vec::with_capacity(records.len());
        let mut portals = Vec::new();
        let mut portal_index = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());

        for rec in records {
            if !seen.insert(rec.id.as_str()) {
                return Err(FogError::DuplicateId(rec.id.clone()));
            }
            if !rec.a.is_finite() || !rec.b.is_finite() {
                return Err(FogError::InvalidGeometry(format!(
                    "wall `{}` has a non-finite endpoint",
                    rec.id
                )));
            }
            let segment = Segment::new(rec.a, rec.b);
            if segment.is_degenerate() {
                return Err(FogError::InvalidGeometry(format!(
                    "wall `{}` has zero length",
                    rec.id
                )));
            }

            if rec.is_portal {
                portal_index.insert(rec.id.clone(), portals.len());
                portal_slot.push(Some(portals.len()));
                portals.push(Portal {
                    id: rec.id.clone(),
                    segment: segments.len(),
                    is_open: rec.is_open,
                });
            } else {
                portal_slot.push(None);
            }
            segments.push(segment);
        }

        let crossings = find_crossings(&segments);
        debug!(
            walls = segments.len() - portals.len(),
            portals = portals.len(),
            crossings = crossings.len(),
            "blocking model loaded"
        );

        Ok(Self {
            segments,
            portal_slot,
            portals,
            portal_index,
            crossings,
            version: 0,
            effective: OnceCell::new(),
            open: OnceCell::new(),
        })
    }

    /// A model with nothing in it; every observer sees a plain circle.
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
            portal_slot: Vec::new(),
            portals: Vec::new(),
            portal_index: HashMap::new(),
            crossings: Vec::new(),
            version: 0,
            effective: OnceCell::new(),
            open: OnceCell::new(),
        }
    }

    /// Monotonic counter, bumped on every portal state change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn wall_count(&self) -> usize {
        self.segments.len() - self.portals.len()
    }

    pub fn portal_count(&self) -> usize {
        self.portals.len()
    }

    pub fn portal_ids(&self) -> impl Iterator<Item = &str> {
        self.portals.iter().map(|p| p.id.as_str())
    }

    /// Segments that currently block sight: walls and closed portals.
    pub fn effective_segments(&self) -> &[Segment] {
        self.effective.get_or_init(|| {
            self.segments
                .iter()
                .zip(&self.portal_slot)
                .filter(|(_, slot)| match slot {
                    Some(p) => !self.portals[*p].is_open,
                    None => true,
                })
                .map(|(s, _)| *s)
                .collect()
        })
    }

    /// Segments of currently open portals. They block nothing, but
    /// the builder still samples their endpoints.
    pub fn open_portal_segments(&self) -> &[Segment] {
        self.open.get_or_init(|| {
            self.portals
                .iter()
                .filter(|p| p.is_open)
                .map(|p| self.segments[p.segment])
                .collect()
        })
    }

    /// Interior crossing points of any two segments. They do not depend
    /// on portal state, so the sample angles built from them do not
    /// either.
    pub fn crossing_points(&self) -> &[Point] {
        &self.crossings
    }

    pub fn is_portal_open(&self, portal_id: &str) -> Result<bool, FogError> {
        let idx = self.portal(portal_id)?;
        Ok(self.portals[idx].is_open)
    }

    /// Open or close a portal. Returns whether the state changed; the
    /// version only moves on a real change.
    pub fn set_portal_open(&mut self, portal_id: &str, open: bool) -> Result<bool, FogError> {
        let idx = self.portal(portal_id)?;
        if self.portals[idx].is_open == open {
            return Ok(false);
        }
        self.portals[idx].is_open = open;
        self.version += 1;
        self.effective.take();
        self.open.take();
        debug!(portal = portal_id, open, version = self.version, "portal changed");
        Ok(true)
    }

    /// Flip a portal; returns its new state.
    pub fn toggle_portal(&mut self, portal_id: &str) -> Result<bool, FogError> {
        let open = !self.is_portal_open(portal_id)?;
        self.set_portal_open(portal_id, open)?;
        Ok(open)
    }

    fn portal(&self, portal_id: &str) -> Result<usize, FogError> {
        self.portal_index
            .get(portal_id)
            .copied()
            .ok_or_else(|| FogError::UnknownPortal(portal_id.to_string()))
    }
}

fn find_crossings(segments: &[Segment]) -> Vec<Point> {
    let mut crossings = Vec::new();
    for (i, p) in segments.iter().enumerate() {
        for q in &segments[i + 1..] {
            if !bounds_overlap(p, q) {
                continue;
            }
            let Some((x, _)) = segment_intersection(p, q) else {
                continue;
            };
            let at_junction = [p.a, p.b, q.a, q.b]
                .iter()
                .any(|e| e.distance_squared(x) <= JUNCTION_TOL_SQ);
            if !at_junction {
                crossings.push(x);
            }
        }
    }
    crossings
}

#[inline]
fn bounds_overlap(p: &Segment, q: &Segment) -> bool {
    p.a.x.min(p.b.x) <= q.a.x.max(q.b.x)
        && q.a.x.min(q.b.x) <= p.a.x.max(p.b.x)
        && p.a.y.min(p.b.y) <= q.a.y.max(q.b.y)
        && q.a.y.min(q.b.y) <= p.a.y.max(p.b.y)
}
