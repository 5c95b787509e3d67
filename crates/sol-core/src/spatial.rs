//! Uniform grid for near-neighbour queries and short-range dust repulsion.
//!
//! The grid is rebuilt from scratch every tick. Cells are only ever looked
//! up by coordinate, never iterated, so the map's internal order cannot leak
//! into results: a query visits the 3x3 block in a fixed offset order and
//! each cell in insertion order.

use crate::effects::DustParticle;
use crate::math::Vec2;
use std::collections::HashMap;

const NEIGHBOR_OFFSETS: [(i32, i32); 9] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (0, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn cell_of(&self, position: Vec2) -> (i32, i32) {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    /// Empty every cell, keeping allocations.
    pub fn clear(&mut self) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
    }

    pub fn insert(&mut self, index: usize, position: Vec2) {
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(index);
    }

    /// Clear and re-insert `positions` by index.
    pub fn rebuild(&mut self, positions: impl IntoIterator<Item = Vec2>) {
        self.clear();
        for (i, p) in positions.into_iter().enumerate() {
            self.insert(i, p);
        }
    }

    /// Indices in the cell containing `position` and its eight neighbours.
    pub fn neighbors(&self, position: Vec2) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = self.cell_of(position);
        NEIGHBOR_OFFSETS.iter().flat_map(move |&(dx, dy)| {
            self.cells
                .get(&(cx + dx, cy + dy))
                .into_iter()
                .flat_map(|bucket| bucket.iter().copied())
        })
    }
}

/// Repulsion strength between two particles `dist` apart, falling off as
/// `(1 - dist/radius)^2` and zero at or beyond `radius`.
#[inline]
pub fn repulsion_falloff(dist: f32, radius: f32) -> f32 {
    if radius <= 0.0 || dist >= radius {
        return 0.0;
    }
    let f = 1.0 - dist / radius;
    f * f
}

/// Parameters for [`step_dust`].
#[derive(Debug, Clone, Copy)]
pub struct DustParams {
    pub repulsion_radius: f32,
    pub repulsion_strength: f32,
    pub unit_push: f32,
    pub damping: f32,
    pub half_extents: Vec2,
}

/// Advance dust by one tick: rebuild the grid, accumulate particle-particle
/// repulsion into a buffer, add pushes from nearby bodies, then integrate.
/// Forces are computed from start-of-tick positions so the result does not
/// depend on update order.
pub fn step_dust(
    particles: &mut [DustParticle],
    grid: &mut SpatialGrid,
    bodies: &[(Vec2, f32)],
    params: &DustParams,
    dt: f32,
) {
    grid.rebuild(particles.iter().map(|p| p.position));

    let mut forces = vec![Vec2::ZERO; particles.len()];
    for (i, p) in particles.iter().enumerate() {
        for j in grid.neighbors(p.position) {
            if j == i {
                continue;
            }
            let (dir, dist) = (p.position - particles[j].position).normalize_with_length();
            let fall = repulsion_falloff(dist, params.repulsion_radius);
            if fall > 0.0 {
                // Coincident particles separate along x, lower index first.
                let dir = if dir == Vec2::ZERO {
                    if i < j { -Vec2::X } else { Vec2::X }
                } else {
                    dir
                };
                forces[i] += dir * (fall * params.repulsion_strength);
            }
        }
        for &(pos, radius) in bodies {
            let reach = radius + params.repulsion_radius;
            let (dir, dist) = (p.position - pos).normalize_with_length();
            let fall = repulsion_falloff(dist, reach);
            if fall > 0.0 {
                forces[i] += dir.normalize_or(Vec2::X) * (fall * params.unit_push);
            }
        }
    }

    let damping = params.damping.clamp(0.0, 1.0);
    let ext = params.half_extents;
    for (p, f) in particles.iter_mut().zip(forces) {
        p.velocity = (p.velocity + f * dt) * damping;
        p.position += p.velocity * dt;
        p.position.x = p.position.x.clamp(-ext.x, ext.x);
        p.position.y = p.position.y.clamp(-ext.y, ext.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DustParams {
        DustParams {
            repulsion_radius: 10.0,
            repulsion_strength: 100.0,
            unit_push: 100.0,
            damping: 1.0,
            half_extents: Vec2::new(1000.0, 1000.0),
        }
    }

    #[test]
    fn neighbors_cover_adjacent_cells_only() {
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild([
            Vec2::new(5.0, 5.0),
            Vec2::new(15.0, 5.0),
            Vec2::new(-5.0, -5.0),
            Vec2::new(35.0, 5.0),
        ]);
        let mut found: Vec<usize> = grid.neighbors(Vec2::new(5.0, 5.0)).collect();
        found.sort();
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn negative_coordinates_floor_into_cells() {
        let grid = SpatialGrid::new(10.0);
        assert_eq!(grid.cell_of(Vec2::new(-0.5, 0.5)), (-1, 0));
    }

    #[test]
    fn rebuild_forgets_previous_tick() {
        let mut grid = SpatialGrid::new(10.0);
        grid.rebuild([Vec2::ZERO]);
        grid.rebuild([Vec2::new(500.0, 500.0)]);
        assert_eq!(grid.neighbors(Vec2::ZERO).count(), 0);
    }

    #[test]
    fn falloff_shape() {
        assert_eq!(repulsion_falloff(0.0, 10.0), 1.0);
        assert_eq!(repulsion_falloff(5.0, 10.0), 0.25);
        assert_eq!(repulsion_falloff(10.0, 10.0), 0.0);
        assert_eq!(repulsion_falloff(3.0, 0.0), 0.0);
    }

    #[test]
    fn close_particles_push_apart() {
        let mut grid = SpatialGrid::new(10.0);
        let mut dust = vec![
            DustParticle {
                position: Vec2::new(0.0, 0.0),
                velocity: Vec2::ZERO,
            },
            DustParticle {
                position: Vec2::new(4.0, 0.0),
                velocity: Vec2::ZERO,
            },
        ];
        step_dust(&mut dust, &mut grid, &[], &params(), 0.1);
        assert!(dust[0].position.x < 0.0);
        assert!(dust[1].position.x > 4.0);
    }

    #[test]
    fn bodies_push_dust() {
        let mut grid = SpatialGrid::new(10.0);
        let mut dust = vec![DustParticle {
            position: Vec2::new(0.0, 12.0),
            velocity: Vec2::ZERO,
        }];
        step_dust(&mut dust, &mut grid, &[(Vec2::ZERO, 8.0)], &params(), 0.1);
        assert!(dust[0].position.y > 12.0);
    }
}
