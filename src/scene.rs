// This file is part of Terravis.
//
// Terravis is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Terravis is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Terravis.  If not, see <http://www.gnu.org/licenses/>.
use bin_terrain::{HeightFeeder, HeightField, TerrainMesh};
use frustvis::{BeamHit, MeshHandle, Movable, OcclusionQueries, QueryId, VisibilityObject};
use geometry::{intersect::box_segment, Aabb, Segment};
use nalgebra::{Point3, Translation3, Vector3};
use std::{cell::Cell, f32::consts::TAU};

/// Steps taken along each line of sight by the horizon occlusion test.
const HORIZON_STEPS: usize = 48;

/// Rolling hills: two long swells, a shorter ripple and a little noise.
pub fn rolling_hills(size: u32, rng: &fastrand::Rng) -> HeightField {
    let phase = [rng.f32() * TAU, rng.f32() * TAU, rng.f32() * TAU];
    HeightField::from_fn(size, size, |row, col| {
        let (x, z) = (row as f32, col as f32);
        60f32 * (x / 41f32 + phase[0]).sin() * (z / 57f32 + phase[1]).cos()
            + 15f32 * ((x + z) / 13f32 + phase[2]).sin()
            + rng.f32()
    })
}

/// A box that sits on the terrain and may wander across it.
pub struct Prop {
    half_extent: Vector3<f32>,
    movable: Cell<Movable>,
    mesh: MeshHandle,
    velocity: Vector3<f32>,
}

impl Prop {
    pub fn new(
        position: Point3<f32>,
        half_extent: Vector3<f32>,
        mesh: u32,
        velocity: Vector3<f32>,
    ) -> Self {
        Self {
            half_extent,
            movable: Cell::new(Movable::new(Translation3::from(position.coords).into(), 0)),
            mesh: MeshHandle(mesh),
            velocity,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        Point3::from(self.movable.get().transform.translation.vector)
    }

    /// Drift by the prop's velocity, wrapping at the map edge and following
    /// the ground.
    pub fn step<H: HeightFeeder>(&self, terrain: &TerrainMesh<H>, extent: f32) {
        if self.velocity == Vector3::zeros() {
            return;
        }
        let p = self.position() + self.velocity;
        let x = p.x.rem_euclid(extent);
        let z = p.z.rem_euclid(extent);
        let position = Vector3::new(x, terrain.height(x, z) + self.half_extent.y, z);
        let update_number = self.movable.get().update_number + 1;
        self.movable
            .set(Movable::new(Translation3::from(position).into(), update_number));
    }
}

impl VisibilityObject for Prop {
    fn object_bbox(&self) -> Aabb {
        Aabb::new(Point3::from(-self.half_extent), Point3::from(self.half_extent))
    }

    fn movable(&self) -> Movable {
        self.movable.get()
    }

    fn shape_number(&self) -> u32 {
        0
    }

    fn mesh(&self) -> Option<MeshHandle> {
        Some(self.mesh)
    }

    fn hit_beam_object(&self, start: &Point3<f32>, end: &Point3<f32>) -> Option<BeamHit> {
        let segment = Segment::new(*start, *end);
        let t = box_segment(&self.object_bbox(), &segment)?;
        Some(BeamHit {
            point: segment.point_at(t),
            distance: t,
            polygon: None,
        })
    }
}

/// Occlusion queries answered on the CPU: a box is hidden if the terrain
/// blocks every line of sight from the eye to the corners and middle of its
/// top face.
pub struct HorizonQueries<'a, H: HeightFeeder> {
    terrain: &'a TerrainMesh<H>,
    eye: Point3<f32>,
    answers: Vec<bool>,
    outstanding: usize,
}

impl<'a, H: HeightFeeder> HorizonQueries<'a, H> {
    pub fn new(terrain: &'a TerrainMesh<H>, eye: Point3<f32>) -> Self {
        Self {
            terrain,
            eye,
            answers: Vec::new(),
            outstanding: 0,
        }
    }

    fn box_visible(&self, bbox: &Aabb) -> bool {
        if bbox.contains_point(&self.eye) {
            return true;
        }
        let (min, max) = (bbox.min(), bbox.max());
        let center = bbox.center();
        [
            Point3::new(center.x, max.y, center.z),
            Point3::new(min.x, max.y, min.z),
            Point3::new(min.x, max.y, max.z),
            Point3::new(max.x, max.y, min.z),
            Point3::new(max.x, max.y, max.z),
        ]
        .iter()
        .any(|target| self.line_of_sight(target))
    }

    fn line_of_sight(&self, target: &Point3<f32>) -> bool {
        let delta = target - self.eye;
        (1..HORIZON_STEPS).all(|i| {
            let p = self.eye + delta * (i as f32 / HORIZON_STEPS as f32);
            p.y >= self.terrain.height(p.x, p.z)
        })
    }
}

impl<'a, H: HeightFeeder> OcclusionQueries for HorizonQueries<'a, H> {
    fn issue(&mut self, bbox: &Aabb) -> QueryId {
        let visible = self.box_visible(bbox);
        self.answers.push(visible);
        self.outstanding += 1;
        QueryId(self.answers.len() as u32 - 1)
    }

    fn poll(&mut self, query: QueryId, _wait: bool) -> Option<bool> {
        self.answers.get(query.0 as usize).copied()
    }

    fn release(&mut self, _query: QueryId) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            self.answers.clear();
        }
    }
}
