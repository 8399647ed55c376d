//! Visibility polygon construction via angular ray sweep.
//!
//! For one observer, rays are cast at every wall endpoint (plus a pair
//! of flanking rays just either side of it, so sight slips past
//! corners) and at evenly spaced angles around the vision circle. The
//! nearest hit of each ray, taken in angle order, is the boundary of
//! the visible region.

use std::collections::HashSet;
use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::blocking::BlockingModel;
use crate::config::FogConfig;
use crate::error::FogError;
use crate::geometry::{
    circle_segment_intersection, normalize_angle, point_in_polygon,
    point_to_segment_distance_squared, polygon_area, ray_segment_intersection, Point, Segment,
    DEGENERATE_LEN_SQ,
};

/// Hits closer than this are the observer standing on a wall; ignored.
const MIN_HIT_DISTANCE: f64 = 1e-9;

/// Vertices within this distance (pixels) of the line through their
/// neighbours are dropped.
const SIMPLIFY_TOLERANCE: f64 = 1e-6;

/// Number of angular buckets for segment partitioning.
const NUM_ANGLE_BUCKETS: usize = 64;
const BUCKET_WIDTH: f64 = TAU / NUM_ANGLE_BUCKETS as f64;

/// Map an angle in [-π, π] to a bucket index in [0, NUM_ANGLE_BUCKETS).
#[inline]
fn angle_to_bucket(angle: f64) -> usize {
    let b = ((angle + PI) / BUCKET_WIDTH) as usize;
    b.min(NUM_ANGLE_BUCKETS - 1)
}

/// One token's eyes for a single build.
#[derive(Debug, Clone, PartialEq)]
pub struct Observer {
    pub token_id: String,
    pub position: Point,
    /// Pixels. 0 is blind.
    pub vision_radius: f64,
}

impl Observer {
    pub fn new(token_id: impl Into<String>, position: Point, vision_radius: f64) -> Self {
        Self {
            token_id: token_id.into(),
            position,
            vision_radius,
        }
    }

    pub fn validate(&self) -> Result<(), FogError> {
        if !self.position.is_finite() {
            return Err(FogError::InvalidGeometry(format!(
                "observer `{}` has a non-finite position",
                self.token_id
            )));
        }
        if self.vision_radius.is_nan() || self.vision_radius < 0.0 {
            return Err(FogError::InvalidRadius(self.vision_radius));
        }
        Ok(())
    }
}

/// Everything one observer can see, as a closed polygon walked in
/// ascending angle around the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityPolygon {
    pub token_id: String,
    pub points: Vec<Point>,
}

impl VisibilityPolygon {
    pub fn empty(token_id: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            points: Vec::new(),
        }
    }

    /// True when the polygon encloses no area (blind observer).
    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p, &self.points)
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ray {
    angle: f64,
    /// Distance of the point that spawned this ray; tie-breaker.
    dist: f64,
    dx: f64,
    dy: f64,
}

/// Reusable buffers so repeated builds do not allocate.
pub struct VisBuffers {
    endpoint_seen: HashSet<(u64, u64)>,
    rays: Vec<Ray>,
    /// Angular buckets: each bucket holds indices into the blocking slice.
    buckets: [Vec<u32>; NUM_ANGLE_BUCKETS],
}

impl VisBuffers {
    pub fn new() -> Self {
        Self {
            endpoint_seen: HashSet::with_capacity(256),
            rays: Vec::with_capacity(768),
            buckets: std::array::from_fn(|_| Vec::with_capacity(16)),
        }
    }
}

impl Default for VisBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of what a build casts against.
#[derive(Debug, Clone, Copy, Default)]
pub struct Occluders<'a> {
    /// Segments that stop rays.
    pub blocking: &'a [Segment],
    /// Segments whose endpoints are sampled but which block nothing.
    pub probes: &'a [Segment],
    /// Extra sample points, typically where walls cross.
    pub crossings: &'a [Point],
}

impl<'a> Occluders<'a> {
    /// The model's current blocking state. Open portals become probes
    /// so the sample angles do not depend on door state.
    pub fn of(model: &'a BlockingModel) -> Self {
        Self {
            blocking: model.effective_segments(),
            probes: model.open_portal_segments(),
            crossings: model.crossing_points(),
        }
    }
}

/// Builds polygons for one observer at a time, reusing its buffers.
pub struct VisibilityBuilder {
    config: FogConfig,
    bufs: VisBuffers,
}

impl VisibilityBuilder {
    pub fn new(config: FogConfig) -> Self {
        Self {
            config,
            bufs: VisBuffers::new(),
        }
    }

    pub fn config(&self) -> &FogConfig {
        &self.config
    }

    /// Validate the observer and build its polygon against the model's
    /// current blocking state.
    pub fn build(
        &mut self,
        observer: &Observer,
        model: &BlockingModel,
    ) -> Result<VisibilityPolygon, FogError> {
        observer.validate()?;
        Ok(build_validated(
            observer,
            Occluders::of(model),
            &self.config,
            &mut self.bufs,
        ))
    }
}

/// Build for an observer that already passed `Observer::validate`.
pub(crate) fn build_validated(
    observer: &Observer,
    occluders: Occluders<'_>,
    config: &FogConfig,
    bufs: &mut VisBuffers,
) -> VisibilityPolygon {
    let mut points = Vec::new();
    compute_visibility_polygon(
        observer.position,
        observer.vision_radius,
        occluders,
        config,
        bufs,
        &mut points,
    );
    trace!(token = %observer.token_id, vertices = points.len(), "visibility polygon built");
    VisibilityPolygon {
        token_id: observer.token_id.clone(),
        points,
    }
}

/// Push the ray aimed at `target` plus its two flanking rays.
fn push_sample_rays(
    rays: &mut Vec<Ray>,
    origin: Point,
    target: Point,
    eps: f64,
    sin_eps: f64,
    cos_eps: f64,
) {
    let dx = target.x - origin.x;
    let dy = target.y - origin.y;
    let dist_sq = dx * dx + dy * dy;
    if dist_sq <= DEGENERATE_LEN_SQ {
        return;
    }
    let dist = dist_sq.sqrt();
    let angle = dy.atan2(dx);
    let ndx = dx / dist;
    let ndy = dy / dist;
    rays.push(Ray {
        angle: normalize_angle(angle - eps),
        dist,
        dx: ndx * cos_eps + ndy * sin_eps,
        dy: -ndx * sin_eps + ndy * cos_eps,
    });
    rays.push(Ray {
        angle,
        dist,
        dx: ndx,
        dy: ndy,
    });
    rays.push(Ray {
        angle: normalize_angle(angle + eps),
        dist,
        dx: ndx * cos_eps - ndy * sin_eps,
        dy: ndx * sin_eps + ndy * cos_eps,
    });
}

/// The part of `seg` inside the circle, or the whole segment when the
/// boundary crossings cannot be resolved.
fn clip_to_circle(center: Point, radius: f64, seg: &Segment) -> Segment {
    let r_sq = radius * radius;
    let a_in = center.distance_squared(seg.a) <= r_sq;
    let b_in = center.distance_squared(seg.b) <= r_sq;
    if a_in && b_in {
        return *seg;
    }
    let t0 = if a_in {
        Some(0.0)
    } else {
        circle_segment_intersection(center, radius, seg)
    };
    let t1 = if b_in {
        Some(1.0)
    } else {
        circle_segment_intersection(center, radius, &Segment::new(seg.b, seg.a)).map(|t| 1.0 - t)
    };
    match (t0, t1) {
        (Some(t0), Some(t1)) if t0 <= t1 => {
            let at = |t: f64| {
                Point::new(
                    seg.a.x + t * (seg.b.x - seg.a.x),
                    seg.a.y + t * (seg.b.y - seg.a.y),
                )
            };
            Segment::new(at(t0), at(t1))
        }
        _ => *seg,
    }
}

/// Compute the visibility polygon seen from `origin`.
///
/// `occluders.blocking` segments stop rays. Probe endpoints and
/// crossing points are sampled like wall endpoints but stop nothing.
pub fn compute_visibility_polygon(
    origin: Point,
    radius: f64,
    occluders: Occluders<'_>,
    config: &FogConfig,
    bufs: &mut VisBuffers,
    result: &mut Vec<Point>,
) {
    result.clear();
    bufs.endpoint_seen.clear();
    bufs.rays.clear();
    if !(radius > 0.0) {
        return;
    }
    let radius = radius.min(config.unlimited_radius);
    let blocking = occluders.blocking;

    // Endpoint and crossing rays at angle and angle ± epsilon. The
    // flanking directions come from rotating the unit vector instead
    // of more trig calls.
    let eps = config.corner_epsilon;
    let (sin_eps, cos_eps) = eps.sin_cos();
    let endpoints = blocking
        .iter()
        .chain(occluders.probes)
        .flat_map(|seg| [seg.a, seg.b]);
    for target in endpoints.chain(occluders.crossings.iter().copied()) {
        if bufs.endpoint_seen.insert((target.x.to_bits(), target.y.to_bits())) {
            push_sample_rays(&mut bufs.rays, origin, target, eps, sin_eps, cos_eps);
        }
    }

    // Evenly spaced rays keep the circle round where no wall is near.
    let n = config.min_circle_samples.max(3);
    let step = TAU / n as f64;
    for k in 0..n {
        let angle = normalize_angle(k as f64 * step);
        let (dy, dx) = angle.sin_cos();
        bufs.rays.push(Ray {
            angle,
            dist: radius,
            dx,
            dy,
        });
    }

    bufs.rays
        .sort_unstable_by(|a, b| a.angle.total_cmp(&b.angle).then(a.dist.total_cmp(&b.dist)));
    debug_assert!(!bufs.rays.is_empty());

    // Each blocking segment goes into every bucket the angular extent
    // of its in-circle part touches, widened by one bucket either side.
    // Segments wholly outside the vision circle can never be hit.
    for bucket in &mut bufs.buckets {
        bucket.clear();
    }
    let radius_sq = radius * radius;
    for (si, seg) in blocking.iter().enumerate() {
        if point_to_segment_distance_squared(origin, seg) > radius_sq {
            continue;
        }
        let seen = clip_to_circle(origin, radius, seg);
        let a1 = (seen.a.y - origin.y).atan2(seen.a.x - origin.x);
        let a2 = (seen.b.y - origin.y).atan2(seen.b.x - origin.x);
        let diff = normalize_angle(a2 - a1);
        let (start, span) = if diff >= 0.0 { (a1, diff) } else { (a2, -diff) };
        let first = angle_to_bucket(start);
        let last = angle_to_bucket(normalize_angle(start + span));
        let mut b = (first + NUM_ANGLE_BUCKETS - 1) % NUM_ANGLE_BUCKETS;
        let stop = (last + 1) % NUM_ANGLE_BUCKETS;
        loop {
            bufs.buckets[b].push(si as u32);
            if b == stop {
                break;
            }
            b = (b + 1) % NUM_ANGLE_BUCKETS;
        }
    }

    // Cast each ray, testing only segments in its bucket. Starting
    // min_t at the radius clips every ray to the vision circle.
    for ray in &bufs.rays {
        let mut min_t = radius;
        for &si in &bufs.buckets[angle_to_bucket(ray.angle)] {
            if let Some(t) = ray_segment_intersection(origin, ray.dx, ray.dy, &blocking[si as usize]) {
                if t > MIN_HIT_DISTANCE && t < min_t {
                    min_t = t;
                }
            }
        }
        result.push(Point::new(origin.x + min_t * ray.dx, origin.y + min_t * ray.dy));
    }

    simplify_polygon(result);
}

/// Drop vertices that duplicate their predecessor or sit on the straight
/// line between their neighbours. Repeats until nothing changes.
fn simplify_polygon(points: &mut Vec<Point>) {
    let tol_sq = SIMPLIFY_TOLERANCE * SIMPLIFY_TOLERANCE;
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    loop {
        let n = points.len();
        if n < 3 {
            return;
        }
        kept.clear();
        for i in 0..n {
            let prev = kept.last().copied().unwrap_or(points[n - 1]);
            let cur = points[i];
            let next = points[(i + 1) % n];
            if !is_redundant(prev, cur, next, tol_sq) {
                kept.push(cur);
            }
        }
        if kept.len() == n {
            return;
        }
        std::mem::swap(points, &mut kept);
    }
}

#[inline]
fn is_redundant(prev: Point, cur: Point, next: Point, tol_sq: f64) -> bool {
    if cur.distance_squared(prev) <= tol_sq {
        return true;
    }
    let ex = next.x - prev.x;
    let ey = next.y - prev.y;
    let len_sq = ex * ex + ey * ey;
    if len_sq <= tol_sq {
        return false;
    }
    let cx = cur.x - prev.x;
    let cy = cur.y - prev.y;
    let cross = ex * cy - ey * cx;
    if cross * cross > tol_sq * len_sq {
        return false;
    }
    // Collinear: redundant only if it lies between its neighbours.
    let dot = ex * cx + ey * cy;
    (0.0..=len_sq).contains(&dot)
}
