//! Shadow raycasting, mirror line of sight and fog of war.
//!
//! Asteroid polygons are flattened into [`Occluder`]s once per tick, after
//! rotation, so every query in the tick sees the same geometry. A segment is
//! blocked only when the first polygon hit lies strictly before its end.

use crate::config::VisibilityMode;
use crate::effects::RevealCone;
use crate::entity::{Asteroid, Sun};
use crate::math::{Ray, Vec2, ray_polygon_intersection, segment_circle_overlap};

/// World-space asteroid geometry for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Occluder {
    pub center: Vec2,
    pub radius: f32,
    pub vertices: Vec<Vec2>,
}

impl Occluder {
    pub fn from_asteroid(asteroid: &Asteroid) -> Self {
        Self {
            center: asteroid.position,
            radius: asteroid.radius,
            vertices: asteroid.world_vertices(),
        }
    }

    /// Distance along `ray` to the polygon, if hit.
    pub fn hit(&self, ray: &Ray) -> Option<f32> {
        ray_polygon_intersection(ray, &self.vertices)
    }
}

/// Whether any occluder blocks the straight path `from` -> `to`.
pub fn segment_obstructed(from: Vec2, to: Vec2, occluders: &[Occluder]) -> bool {
    let Some((ray, dist)) = Ray::between(from, to) else {
        return false;
    };
    occluders.iter().any(|o| {
        segment_circle_overlap(from, to, o.center, o.radius)
            && o.hit(&ray).is_some_and(|t| t < dist)
    })
}

/// Distance along `ray` to the nearest occluder, capped at `max`.
pub fn first_obstruction(ray: &Ray, max: f32, occluders: &[Occluder]) -> f32 {
    occluders
        .iter()
        .filter_map(|o| o.hit(ray))
        .fold(max, f32::min)
}

/// Nearest sun to `point`; ties go to the earlier sun.
pub fn nearest_sun(point: Vec2, suns: &[Sun]) -> Option<&Sun> {
    let mut best: Option<(&Sun, f32)> = None;
    for sun in suns {
        let d = sun.position.distance_sq(point);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((sun, d));
        }
    }
    best.map(|(s, _)| s)
}

/// A point is in shadow when no sun is reachable by an unobstructed ray.
/// Without suns everything is in shadow.
pub fn is_in_shadow(point: Vec2, suns: &[Sun], occluders: &[Occluder]) -> bool {
    suns.iter()
        .all(|sun| segment_obstructed(point, sun.position, occluders))
}

/// Mirror line of sight: both the mirror -> target ray and the mirror ->
/// nearest-sun ray must be clear. Returns the sun that lights the mirror.
pub fn line_of_sight<'a>(
    mirror: Vec2,
    target: Vec2,
    suns: &'a [Sun],
    occluders: &[Occluder],
) -> Option<&'a Sun> {
    let sun = nearest_sun(mirror, suns)?;
    if segment_obstructed(mirror, sun.position, occluders) {
        return None;
    }
    if segment_obstructed(mirror, target, occluders) {
        return None;
    }
    Some(sun)
}

pub fn has_line_of_sight(mirror: Vec2, target: Vec2, suns: &[Sun], occluders: &[Occluder]) -> bool {
    line_of_sight(mirror, target, suns, occluders).is_some()
}

// ---------------------------------------------------------------------------
// Fog of war
// ---------------------------------------------------------------------------

/// Everything fog of war needs to know about one viewing player.
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub team: u8,
    pub core_position: Option<Vec2>,
    pub influence_radius: f32,
}

/// Sources of vision that override hiding.
pub struct VisionSources<'a> {
    /// `(team, position, vision radius)` of every live unit.
    pub units: &'a [(u8, Vec2, f32)],
    pub reveals: &'a [RevealCone],
}

/// Whether the active mode hides `point` from `viewer`, before exceptions.
pub fn hidden_by_mode(
    point: Vec2,
    viewer: &Viewer,
    mode: VisibilityMode,
    suns: &[Sun],
    occluders: &[Occluder],
) -> bool {
    match mode {
        VisibilityMode::Shadow => is_in_shadow(point, suns, occluders),
        VisibilityMode::Divider { normal, offset } => {
            let side = |p: Vec2| normal.dot(p) - offset >= 0.0;
            match viewer.core_position {
                Some(core) => side(point) != side(core),
                None => true,
            }
        }
    }
}

/// Fog-of-war query. A hidden point is still visible when it lies within a
/// friendly unit's vision, within the viewer's core influence, or inside a
/// friendly reveal cone.
pub fn is_visible(
    point: Vec2,
    viewer: &Viewer,
    mode: VisibilityMode,
    suns: &[Sun],
    occluders: &[Occluder],
    sources: &VisionSources<'_>,
) -> bool {
    if !hidden_by_mode(point, viewer, mode, suns, occluders) {
        return true;
    }
    if viewer
        .core_position
        .is_some_and(|core| core.distance_sq(point) <= viewer.influence_radius * viewer.influence_radius)
    {
        return true;
    }
    if sources
        .units
        .iter()
        .any(|&(team, pos, r)| team == viewer.team && pos.distance_sq(point) <= r * r)
    {
        return true;
    }
    sources
        .reveals
        .iter()
        .any(|cone| cone.team == viewer.team && cone.contains(point))
}
