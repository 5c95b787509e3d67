//! Mirror movement, link validation and light-gated energy transfer.
//!
//! A mirror transmits only to its current link and only while it has an
//! unobstructed ray to its nearest sun and to the link. Light delivered to
//! a core is also credited to the owner's energy pool; light delivered to a
//! building powers its construction or production.

use crate::config::Tuning;
use crate::entity::{Building, BuildingKind, CoreStructure, MirrorLink, SolarMirror, Sun};
use crate::fixed::{Fixed64, f32_to_fixed64};
use crate::id::{BuildingId, CoreId, MirrorId, PlayerId};
use crate::math::Vec2;
use crate::visibility::{Occluder, line_of_sight};
use slotmap::SlotMap;

/// Shared inputs for one player's mirror pass.
pub struct LightContext<'a> {
    pub suns: &'a [Sun],
    pub occluders: &'a [Occluder],
    /// Owner's upgrade multiplier.
    pub bonus: Fixed64,
    pub dt: f32,
}

/// A mirror at `position` with stats from `tuning`, not yet linked.
pub fn new_mirror(owner: PlayerId, position: Vec2, tuning: &Tuning) -> SolarMirror {
    SolarMirror {
        owner,
        position,
        move_target: None,
        speed: tuning.mirror_speed,
        health: tuning.mirror_health,
        max_health: tuning.mirror_health,
        radius: tuning.mirror_radius,
        link: MirrorLink::None,
        reflection_angle: 0.0,
        energy_rate: f32_to_fixed64(tuning.mirror_energy_rate),
        efficiency: f32_to_fixed64(tuning.mirror_efficiency),
        last_output: Fixed64::ZERO,
    }
}

/// Step a mirror toward its move target.
pub fn move_mirror(mirror: &mut SolarMirror, dt: f32) {
    let Some(target) = mirror.move_target else {
        return;
    };
    mirror.position = mirror.position.move_toward(target, mirror.speed * dt);
    if mirror.position == target {
        mirror.move_target = None;
    }
}

/// World position of a mirror's link if it is still a valid target: alive,
/// same owner and, for warp gates, complete.
pub fn link_target(
    mirror: &SolarMirror,
    cores: &SlotMap<CoreId, CoreStructure>,
    buildings: &SlotMap<BuildingId, Building>,
) -> Option<Vec2> {
    match mirror.link {
        MirrorLink::None => None,
        MirrorLink::Core(id) => cores
            .get(id)
            .filter(|c| c.owner == mirror.owner && c.health > 0.0)
            .map(|c| c.position),
        MirrorLink::Building(id) => buildings
            .get(id)
            .filter(|b| is_linkable(b) && b.owner == mirror.owner)
            .map(|b| b.position),
    }
}

/// Whether a building can receive mirror light at all.
pub fn is_linkable(building: &Building) -> bool {
    building.health > 0.0 && (building.kind != BuildingKind::WarpGate || building.is_complete())
}

/// Energy a mirror sends this tick: `rate * efficiency * bonus * intensity
/// * dt` when both rays are clear, otherwise exactly zero. Also updates the
/// reflection angle, which bisects the sun and link directions.
pub fn transfer(mirror: &mut SolarMirror, target: Vec2, ctx: &LightContext<'_>) -> Fixed64 {
    let Some(sun) = line_of_sight(mirror.position, target, ctx.suns, ctx.occluders) else {
        return Fixed64::ZERO;
    };
    let to_sun = (sun.position - mirror.position).normalize();
    let to_target = (target - mirror.position).normalize();
    mirror.reflection_angle = (to_sun + to_target).normalize_or(to_sun).angle();

    mirror
        .energy_rate
        .saturating_mul(mirror.efficiency)
        .saturating_mul(ctx.bonus)
        .saturating_mul(f32_to_fixed64(sun.intensity))
        .saturating_mul(f32_to_fixed64(ctx.dt))
}

/// Run one player's mirrors: move, validate links, transfer light.
/// Returns the energy credited to the player's pool.
pub fn update_mirrors(
    owner: PlayerId,
    mirrors: &mut SlotMap<MirrorId, SolarMirror>,
    cores: &mut SlotMap<CoreId, CoreStructure>,
    buildings: &mut SlotMap<BuildingId, Building>,
    ctx: &LightContext<'_>,
) -> Fixed64 {
    let mut credited = Fixed64::ZERO;
    for (_, mirror) in mirrors.iter_mut() {
        if mirror.owner != owner || mirror.health <= 0.0 {
            continue;
        }
        move_mirror(mirror, ctx.dt);
        mirror.last_output = Fixed64::ZERO;

        let Some(target) = link_target(mirror, cores, buildings) else {
            if mirror.link != MirrorLink::None {
                tracing::trace!(player = %owner, "mirror link dropped");
            }
            mirror.link = MirrorLink::None;
            continue;
        };

        let amount = transfer(mirror, target, ctx);
        mirror.last_output = amount;
        if amount == Fixed64::ZERO {
            continue;
        }
        match mirror.link {
            MirrorLink::Core(id) => {
                if let Some(core) = cores.get_mut(id) {
                    core.incoming_light = core.incoming_light.saturating_add(amount);
                    credited = credited.saturating_add(amount);
                }
            }
            MirrorLink::Building(id) => {
                if let Some(b) = buildings.get_mut(id) {
                    b.incoming_light = b.incoming_light.saturating_add(amount);
                }
            }
            MirrorLink::None => {}
        }
    }
    credited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::new_core;

    fn sun() -> Sun {
        Sun {
            position: Vec2::ZERO,
            radius: 100.0,
            intensity: 1.0,
            orbit: None,
        }
    }

    fn mirror_at(x: f32, y: f32, link: MirrorLink) -> SolarMirror {
        let mut m = new_mirror(PlayerId(0), Vec2::new(x, y), &Tuning::default());
        m.link = link;
        m
    }

    fn core_at(x: f32, y: f32) -> CoreStructure {
        new_core(PlayerId(0), Vec2::new(x, y), &Tuning::default())
    }

    fn wall(x: f32, y: f32) -> Occluder {
        let c = Vec2::new(x, y);
        Occluder {
            center: c,
            radius: 30.0,
            vertices: vec![
                c + Vec2::new(-20.0, -20.0),
                c + Vec2::new(20.0, -20.0),
                c + Vec2::new(20.0, 20.0),
                c + Vec2::new(-20.0, 20.0),
            ],
        }
    }

    fn ctx<'a>(suns: &'a [Sun], occ: &'a [Occluder]) -> LightContext<'a> {
        LightContext {
            suns,
            occluders: occ,
            bonus: Fixed64::ONE,
            dt: 0.5,
        }
    }

    #[test]
    fn mirror_moves_and_stops_at_target() {
        let mut m = mirror_at(0.0, 0.0, MirrorLink::None);
        m.move_target = Some(Vec2::new(40.0, 0.0));
        move_mirror(&mut m, 0.5);
        assert_eq!(m.position, Vec2::new(30.0, 0.0));
        move_mirror(&mut m, 0.5);
        assert_eq!(m.position, Vec2::new(40.0, 0.0));
        assert!(m.move_target.is_none());
    }

    #[test]
    fn clear_mirror_feeds_core_and_pool() {
        let suns = [sun()];
        let mut cores = SlotMap::with_key();
        let core = cores.insert(core_at(-500.0, 0.0));
        let mut mirrors = SlotMap::with_key();
        mirrors.insert(mirror_at(-300.0, 0.0, MirrorLink::Core(core)));
        let mut buildings = SlotMap::with_key();

        let got = update_mirrors(PlayerId(0), &mut mirrors, &mut cores, &mut buildings, &ctx(&suns, &[]));
        assert_eq!(got, Fixed64::from_num(5));
        assert_eq!(cores[core].incoming_light, Fixed64::from_num(5));
    }

    #[test]
    fn blocked_sun_ray_gives_exactly_zero() {
        let suns = [sun()];
        let occ = [wall(-150.0, 0.0)];
        let mut cores = SlotMap::with_key();
        let core = cores.insert(core_at(-300.0, 300.0));
        let mut mirrors = SlotMap::with_key();
        let m = mirrors.insert(mirror_at(-300.0, 0.0, MirrorLink::Core(core)));
        let mut buildings = SlotMap::with_key();

        let got = update_mirrors(PlayerId(0), &mut mirrors, &mut cores, &mut buildings, &ctx(&suns, &occ));
        assert_eq!(got, Fixed64::ZERO);
        assert_eq!(mirrors[m].last_output, Fixed64::ZERO);
        assert_eq!(cores[core].incoming_light, Fixed64::ZERO);
    }

    #[test]
    fn blocked_link_ray_gives_exactly_zero() {
        let suns = [sun()];
        let occ = [wall(-300.0, 150.0)];
        let mut cores = SlotMap::with_key();
        let core = cores.insert(core_at(-300.0, 300.0));
        let mut mirrors = SlotMap::with_key();
        mirrors.insert(mirror_at(-300.0, 0.0, MirrorLink::Core(core)));
        let mut buildings = SlotMap::with_key();

        let got = update_mirrors(PlayerId(0), &mut mirrors, &mut cores, &mut buildings, &ctx(&suns, &occ));
        assert_eq!(got, Fixed64::ZERO);
    }

    #[test]
    fn link_to_foreign_core_is_dropped() {
        let suns = [sun()];
        let mut cores = SlotMap::with_key();
        let mut enemy = core_at(-500.0, 0.0);
        enemy.owner = PlayerId(1);
        let core = cores.insert(enemy);
        let mut mirrors = SlotMap::with_key();
        let m = mirrors.insert(mirror_at(-300.0, 0.0, MirrorLink::Core(core)));
        let mut buildings = SlotMap::with_key();

        let got = update_mirrors(PlayerId(0), &mut mirrors, &mut cores, &mut buildings, &ctx(&suns, &[]));
        assert_eq!(got, Fixed64::ZERO);
        assert_eq!(mirrors[m].link, MirrorLink::None);
    }

    #[test]
    fn efficiency_and_bonus_scale_output() {
        let suns = [Sun {
            intensity: 2.0,
            ..sun()
        }];
        let mut m = mirror_at(-300.0, 0.0, MirrorLink::None);
        m.efficiency = Fixed64::from_num(0.5);
        let c = LightContext {
            bonus: Fixed64::from_num(1.25),
            ..ctx(&suns, &[])
        };
        let got = transfer(&mut m, Vec2::new(-500.0, 0.0), &c);
        // 10 * 0.5 * 1.25 * 2 * 0.5
        assert_eq!(got, Fixed64::from_num(6.25));
    }

    #[test]
    fn reflection_bisects_sun_and_target() {
        let suns = [sun()];
        let mut m = mirror_at(-300.0, 0.0, MirrorLink::None);
        transfer(&mut m, Vec2::new(-300.0, -300.0), &ctx(&suns, &[]));
        // Sun along +x, target along -y: bisector points down-right.
        assert!((m.reflection_angle + std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }
}
