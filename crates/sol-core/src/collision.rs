//! Collision and repulsion resolution.
//!
//! Runs after every unit has moved (phase 7), plus asteroid knockback
//! before anything moves (phase 4). All passes iterate units in arena key
//! order and read pair positions before writing, so results depend only on
//! state, never on hash order or thread timing.

use crate::entity::{Asteroid, Unit, UnitOrder};
use crate::id::UnitId;
use crate::math::{EPSILON, Vec2};
use slotmap::SlotMap;

/// Slack allowed when deciding a unit is still inside an obstacle.
const PENETRATION_SLACK: f32 = 1e-3;

// ---------------------------------------------------------------------------
// Unit vs unit
// ---------------------------------------------------------------------------

/// Fallback separation axis for coincident units, alternating by the index
/// of the first unit in the pair.
#[inline]
fn tie_break_axis(index: usize) -> Vec2 {
    if index % 2 == 0 { Vec2::X } else { Vec2::Y }
}

/// Separate every overlapping pair of live units. Heroes are heavy: when
/// exactly one unit of a pair is a hero, only the other moves the full
/// overlap; otherwise each moves half.
pub fn resolve_unit_collisions(units: &mut SlotMap<UnitId, Unit>) {
    let ids: Vec<UnitId> = units
        .iter()
        .filter(|(_, u)| u.health > 0.0)
        .map(|(id, _)| id)
        .collect();

    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (a_pos, a_r, a_hero) = {
                let a = &units[ids[i]];
                (a.position, a.radius, a.is_hero())
            };
            let (b_pos, b_r, b_hero) = {
                let b = &units[ids[j]];
                (b.position, b.radius, b.is_hero())
            };

            let min_dist = a_r + b_r;
            let (normal, dist) = (b_pos - a_pos).normalize_with_length();
            if dist >= min_dist {
                continue;
            }
            let normal = if dist > EPSILON {
                normal
            } else {
                tie_break_axis(i)
            };
            let overlap = min_dist - dist;

            match (a_hero, b_hero) {
                (true, false) => units[ids[j]].position += normal * overlap,
                (false, true) => units[ids[i]].position -= normal * overlap,
                _ => {
                    let half = overlap * 0.5;
                    units[ids[i]].position -= normal * half;
                    units[ids[j]].position += normal * half;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit vs obstacle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleKind {
    Asteroid,
    Core,
    Mirror,
    Building,
}

/// A circular body units may not overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub position: Vec2,
    pub radius: f32,
    pub kind: ObstacleKind,
    /// Set for mirrors, which only block enemy units.
    pub team: Option<u8>,
}

impl Obstacle {
    #[inline]
    pub fn blocks(&self, unit_team: u8) -> bool {
        self.team.is_none_or(|t| t != unit_team)
    }

    #[inline]
    fn penetrates(&self, position: Vec2, radius: f32) -> bool {
        position.distance(self.position) < self.radius + radius - PENETRATION_SLACK
    }
}

/// Tuning for [`resolve_unit_obstacles`].
#[derive(Debug, Clone, Copy)]
pub struct PushParams {
    pub push_multiplier: f32,
    pub max_push_distance: f32,
}

/// Soft-push units out of obstacles, then hard-revert any unit that is still
/// inside one to its pre-collision position.
///
/// Each overlapping obstacle contributes `(min - dist) / min` along its
/// outward normal. The summed push is normalized and the unit moves
/// `min(max_push_distance, |push| * push_multiplier)`. A reverted unit also
/// drops a rally point that itself lies inside an obstacle.
pub fn resolve_unit_obstacles(
    units: &mut SlotMap<UnitId, Unit>,
    obstacles: &[Obstacle],
    team_of: impl Fn(&Unit) -> u8,
    params: &PushParams,
) {
    for (_, unit) in units.iter_mut() {
        if unit.health <= 0.0 {
            continue;
        }
        let team = team_of(unit);
        let mut push = Vec2::ZERO;
        let mut touching = false;
        for o in obstacles.iter().filter(|o| o.blocks(team)) {
            let min_dist = o.radius + unit.radius;
            let (normal, dist) = (unit.position - o.position).normalize_with_length();
            if dist >= min_dist {
                continue;
            }
            let normal = if dist > EPSILON { normal } else { Vec2::X };
            push += normal * ((min_dist - dist) / min_dist);
            touching = true;
        }
        if !touching {
            continue;
        }

        let (dir, magnitude) = push.normalize_with_length();
        if magnitude > EPSILON {
            let step = (magnitude * params.push_multiplier).min(params.max_push_distance);
            unit.position += dir * step;
        }

        revert_if_embedded(unit, obstacles, team);
    }
}

/// Hard-revert a unit that still overlaps a blocking obstacle to its
/// pre-collision position, dropping a rally point that is itself inside an
/// obstacle. Returns whether the unit was reverted.
fn revert_if_embedded(unit: &mut Unit, obstacles: &[Obstacle], team: u8) -> bool {
    let embedded = obstacles
        .iter()
        .any(|o| o.blocks(team) && o.penetrates(unit.position, unit.radius));
    if !embedded {
        return false;
    }
    unit.position = unit.prev_position;
    if let UnitOrder::Rally(point) = unit.order {
        if obstacles.iter().any(|o| o.blocks(team) && o.penetrates(point, 0.0)) {
            unit.order = UnitOrder::Idle;
        }
    }
    true
}

/// Final no-penetration pass, run after every position correction of the
/// collision phase. Any live unit left inside a blocking obstacle goes
/// back to its pre-collision position.
pub fn revert_embedded_units(
    units: &mut SlotMap<UnitId, Unit>,
    obstacles: &[Obstacle],
    team_of: impl Fn(&Unit) -> u8,
) -> usize {
    let mut reverted = 0;
    for (_, unit) in units.iter_mut() {
        if unit.health <= 0.0 {
            continue;
        }
        let team = team_of(unit);
        if revert_if_embedded(unit, obstacles, team) {
            reverted += 1;
        }
    }
    reverted
}

/// Project units radially out of the standoff ring around structures. A
/// position correction only; velocity is untouched.
pub fn enforce_structure_standoff(
    units: &mut SlotMap<UnitId, Unit>,
    structures: &[(Vec2, f32)],
    standoff: f32,
) {
    for (_, unit) in units.iter_mut() {
        if unit.health <= 0.0 {
            continue;
        }
        for &(center, radius) in structures {
            let min_dist = radius + unit.radius + standoff;
            let (normal, dist) = (unit.position - center).normalize_with_length();
            if dist < min_dist {
                let normal = if dist > EPSILON { normal } else { Vec2::X };
                unit.position = center + normal * min_dist;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Asteroid knockback
// ---------------------------------------------------------------------------

/// Move a body out of every asteroid's clearance circle along the
/// center-to-body direction, at most `speed * dt` per asteroid per tick.
/// Rotating polygons can sweep over stationary bodies; this keeps them
/// from staying embedded.
pub fn asteroid_knockback(
    position: &mut Vec2,
    body_radius: f32,
    asteroids: &[&Asteroid],
    speed: f32,
    padding: f32,
    dt: f32,
) {
    let max_step = speed * dt;
    for a in asteroids {
        let clear = a.radius + body_radius + padding;
        let (normal, dist) = (*position - a.position).normalize_with_length();
        if dist >= clear {
            continue;
        }
        let normal = if dist > EPSILON { normal } else { Vec2::X };
        *position += normal * (clear - dist).min(max_step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::Outbox;
    use crate::entity::{HeroKind, UnitKind};
    use crate::id::PlayerId;

    fn unit(x: f32, y: f32, radius: f32, kind: UnitKind) -> Unit {
        let position = Vec2::new(x, y);
        Unit {
            owner: PlayerId(0),
            kind,
            position,
            prev_position: position,
            velocity: Vec2::ZERO,
            health: 100.0,
            max_health: 100.0,
            radius,
            speed: 50.0,
            vision_radius: 100.0,
            order: UnitOrder::Idle,
            attack: None,
            ability_cooldown: 0.0,
            pending_ability: None,
            outbox: Outbox::default(),
        }
    }

    fn params() -> PushParams {
        PushParams {
            push_multiplier: 0.5,
            max_push_distance: 4.0,
        }
    }

    fn rock(x: f32, y: f32, radius: f32) -> Obstacle {
        Obstacle {
            position: Vec2::new(x, y),
            radius,
            kind: ObstacleKind::Asteroid,
            team: None,
        }
    }

    // -----------------------------------------------------------------------
    // Unit vs unit
    // -----------------------------------------------------------------------

    #[test]
    fn coincident_units_separate_along_x() {
        let mut units = SlotMap::with_key();
        let a = units.insert(unit(10.0, 10.0, 8.0, UnitKind::Soldier));
        let b = units.insert(unit(10.0, 10.0, 8.0, UnitKind::Soldier));
        resolve_unit_collisions(&mut units);

        let delta = units[b].position - units[a].position;
        assert!((delta.length() - 16.0).abs() < 1e-4);
        assert!(delta.y.abs() < 1e-6, "separation must be along x");
    }

    #[test]
    fn hero_is_not_pushed_by_regular_unit() {
        let mut units = SlotMap::with_key();
        let hero = units.insert(unit(0.0, 0.0, 10.0, UnitKind::Hero(HeroKind::Seer)));
        let grunt = units.insert(unit(15.0, 0.0, 10.0, UnitKind::Soldier));
        resolve_unit_collisions(&mut units);

        assert_eq!(units[hero].position, Vec2::ZERO);
        assert!((units[grunt].position.x - 20.0).abs() < 1e-4);
    }

    #[test]
    fn two_heroes_split_overlap() {
        let mut units = SlotMap::with_key();
        let a = units.insert(unit(0.0, 0.0, 10.0, UnitKind::Hero(HeroKind::Lancer)));
        let b = units.insert(unit(10.0, 0.0, 10.0, UnitKind::Hero(HeroKind::Seer)));
        resolve_unit_collisions(&mut units);
        assert!((units[a].position.x + 5.0).abs() < 1e-4);
        assert!((units[b].position.x - 15.0).abs() < 1e-4);
    }

    #[test]
    fn dead_units_are_ignored() {
        let mut units = SlotMap::with_key();
        let a = units.insert(unit(0.0, 0.0, 10.0, UnitKind::Soldier));
        let b = units.insert(unit(5.0, 0.0, 10.0, UnitKind::Soldier));
        units[b].health = 0.0;
        resolve_unit_collisions(&mut units);
        assert_eq!(units[a].position, Vec2::ZERO);
    }

    // -----------------------------------------------------------------------
    // Unit vs obstacle
    // -----------------------------------------------------------------------

    #[test]
    fn soft_push_clears_shallow_overlap() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(47.0, 0.0, 10.0, UnitKind::Soldier));
        let strong = PushParams {
            push_multiplier: 100.0,
            max_push_distance: 4.0,
        };
        // Weight 3/50 scaled by 100 is capped at 4.
        resolve_unit_obstacles(&mut units, &[rock(0.0, 0.0, 40.0)], |_| 0, &strong);
        assert!((units[id].position.x - 51.0).abs() < 1e-4);
    }

    #[test]
    fn deep_overlap_reverts_to_previous_position() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(30.0, 0.0, 10.0, UnitKind::Soldier));
        units[id].prev_position = Vec2::new(80.0, 0.0);
        units[id].order = UnitOrder::Rally(Vec2::new(5.0, 0.0));
        resolve_unit_obstacles(&mut units, &[rock(0.0, 0.0, 40.0)], |_| 0, &params());

        assert_eq!(units[id].position, Vec2::new(80.0, 0.0));
        assert_eq!(units[id].order, UnitOrder::Idle);
    }

    #[test]
    fn rally_outside_obstacle_survives_revert() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(30.0, 0.0, 10.0, UnitKind::Soldier));
        units[id].prev_position = Vec2::new(80.0, 0.0);
        units[id].order = UnitOrder::Rally(Vec2::new(-100.0, 0.0));
        resolve_unit_obstacles(&mut units, &[rock(0.0, 0.0, 40.0)], |_| 0, &params());
        assert_eq!(units[id].order, UnitOrder::Rally(Vec2::new(-100.0, 0.0)));
    }

    #[test]
    fn friendly_mirrors_do_not_block() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(5.0, 0.0, 10.0, UnitKind::Soldier));
        units[id].prev_position = Vec2::new(50.0, 0.0);
        let mirror = Obstacle {
            position: Vec2::ZERO,
            radius: 12.0,
            kind: ObstacleKind::Mirror,
            team: Some(0),
        };
        resolve_unit_obstacles(&mut units, &[mirror], |_| 0, &params());
        assert_eq!(units[id].position, Vec2::new(5.0, 0.0));

        resolve_unit_obstacles(&mut units, &[mirror], |_| 1, &params());
        assert_eq!(units[id].position, Vec2::new(50.0, 0.0));
    }

    #[test]
    fn standoff_projects_radially() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(0.0, 45.0, 8.0, UnitKind::Worker));
        enforce_structure_standoff(&mut units, &[(Vec2::ZERO, 40.0)], 6.0);
        assert!((units[id].position.y - 54.0).abs() < 1e-4);
        assert_eq!(units[id].velocity, Vec2::ZERO);
    }

    #[test]
    fn standoff_into_rock_is_reverted() {
        let mut units = SlotMap::with_key();
        let id = units.insert(unit(0.0, 47.0, 9.0, UnitKind::Soldier));
        let rocks = [rock(0.0, 79.0, 20.0)];
        enforce_structure_standoff(&mut units, &[(Vec2::ZERO, 40.0)], 6.0);
        assert!((units[id].position.y - 55.0).abs() < 1e-4);

        assert_eq!(revert_embedded_units(&mut units, &rocks, |_| 0), 1);
        assert_eq!(units[id].position, Vec2::new(0.0, 47.0));
        assert_eq!(revert_embedded_units(&mut units, &rocks, |_| 0), 0);
    }

    // -----------------------------------------------------------------------
    // Knockback
    // -----------------------------------------------------------------------

    #[test]
    fn knockback_is_rate_limited_and_stops_when_clear() {
        let rock = Asteroid::new(
            Vec2::ZERO,
            vec![Vec2::new(60.0, 0.0), Vec2::new(0.0, 60.0), Vec2::new(-60.0, 0.0), Vec2::new(0.0, -60.0)],
            0.5,
        );
        let mut p = Vec2::new(55.0, 0.0);
        asteroid_knockback(&mut p, 8.0, &[&rock], 240.0, 4.0, 1.0 / 60.0);
        assert!((p.x - 59.0).abs() < 1e-3);

        for _ in 0..10 {
            asteroid_knockback(&mut p, 8.0, &[&rock], 240.0, 4.0, 1.0 / 60.0);
        }
        assert!((p.x - 72.0).abs() < 1e-3);
    }
}
