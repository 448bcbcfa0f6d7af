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
use crate::{
    BeamHit, MeshHandle, Movable, OcclusionQueries, QueryId, VisFlags, VisObjectId,
    VisibilityCuller, VisibilityObject,
};
use fxhash::FxHashMap;
use geometry::{intersect::box_segment, Aabb, Segment};
use nalgebra::{Point3, Translation3, Vector3};
use std::{cell::Cell, rc::Rc};

/// A box shaped scene object that can be moved and flagged.
pub(crate) struct Block {
    bbox: Aabb,
    movable: Cell<Movable>,
    shape: Cell<u32>,
    mesh: Option<MeshHandle>,
    flags: Cell<VisFlags>,
}

impl Block {
    pub(crate) fn new(min: Point3<f32>, max: Point3<f32>, mesh: u32) -> Rc<Self> {
        Rc::new(Self {
            bbox: Aabb::new(min, max),
            movable: Cell::new(Movable::default()),
            shape: Cell::new(0),
            mesh: Some(MeshHandle(mesh)),
            flags: Cell::new(VisFlags::empty()),
        })
    }

    pub(crate) fn unit(x: f32, y: f32, z: f32, mesh: u32) -> Rc<Self> {
        Self::new(Point3::new(x, y, z), Point3::new(x + 1f32, y + 1f32, z + 1f32), mesh)
    }

    pub(crate) fn without_mesh(min: Point3<f32>, max: Point3<f32>) -> Rc<Self> {
        Rc::new(Self {
            bbox: Aabb::new(min, max),
            movable: Cell::new(Movable::default()),
            shape: Cell::new(0),
            mesh: None,
            flags: Cell::new(VisFlags::empty()),
        })
    }

    pub(crate) fn move_to(&self, offset: Vector3<f32>) {
        let update_number = self.movable.get().update_number + 1;
        self.movable
            .set(Movable::new(Translation3::from(offset).into(), update_number));
    }

    pub(crate) fn set_flags(&self, flags: VisFlags) {
        self.flags.set(flags);
    }
}

impl VisibilityObject for Block {
    fn object_bbox(&self) -> Aabb {
        self.bbox
    }

    fn movable(&self) -> Movable {
        self.movable.get()
    }

    fn shape_number(&self) -> u32 {
        self.shape.get()
    }

    fn mesh(&self) -> Option<MeshHandle> {
        self.mesh
    }

    fn flags(&self) -> VisFlags {
        self.flags.get()
    }

    fn hit_beam_object(&self, start: &Point3<f32>, end: &Point3<f32>) -> Option<BeamHit> {
        let segment = Segment::new(*start, *end);
        let t = box_segment(&self.bbox, &segment)?;
        Some(BeamHit {
            point: segment.point_at(t),
            distance: t,
            polygon: Some(0),
        })
    }
}

pub(crate) fn register(culler: &mut VisibilityCuller, block: &Rc<Block>) -> VisObjectId {
    let object: Rc<dyn VisibilityObject> = block.clone();
    culler.register(&object)
}

pub(crate) fn mesh_id(object: &Rc<dyn VisibilityObject>) -> u32 {
    object.mesh().map_or(u32::MAX, |mesh| mesh.0)
}

pub(crate) fn sorted_meshes(objects: &[Rc<dyn VisibilityObject>]) -> Vec<u32> {
    let mut out = objects.iter().map(mesh_id).collect::<Vec<_>>();
    out.sort_unstable();
    out
}

/// Occlusion queries answered by a fixed rule, each one only after it has
/// been polled `delay` times without waiting.
pub(crate) struct Oracle {
    rule: fn(&Aabb) -> bool,
    delay: u32,
    outstanding: FxHashMap<u32, (bool, u32)>,
    next: u32,
    pub(crate) issued: usize,
    pub(crate) released: usize,
}

impl Oracle {
    pub(crate) fn new(rule: fn(&Aabb) -> bool, delay: u32) -> Self {
        Self {
            rule,
            delay,
            outstanding: FxHashMap::default(),
            next: 0,
            issued: 0,
            released: 0,
        }
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

impl OcclusionQueries for Oracle {
    fn issue(&mut self, bbox: &Aabb) -> QueryId {
        let id = self.next;
        self.next += 1;
        self.issued += 1;
        self.outstanding.insert(id, ((self.rule)(bbox), self.delay));
        QueryId(id)
    }

    fn poll(&mut self, query: QueryId, wait: bool) -> Option<bool> {
        let (visible, remaining) = self.outstanding.get_mut(&query.0)?;
        if wait || *remaining == 0 {
            Some(*visible)
        } else {
            *remaining -= 1;
            None
        }
    }

    fn release(&mut self, query: QueryId) {
        if self.outstanding.remove(&query.0).is_some() {
            self.released += 1;
        }
    }
}
