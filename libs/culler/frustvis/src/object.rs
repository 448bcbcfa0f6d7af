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
use bitflags::bitflags;
use geometry::Aabb;
use nalgebra::{Isometry3, Point3};
use std::{fmt, rc::Rc};

/// Opaque reference to whatever the renderer draws for an object.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MeshHandle(pub u32);

impl fmt::Display for MeshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

bitflags! {
    pub struct VisFlags: u32 {
        /// Never report the object as visible.
        const INVISIBLE = 1 << 0;
        /// Skip the object in segment queries.
        const NO_HIT_BEAM = 1 << 1;
    }
}

/// Where an object sits in the world. `update_number` must change whenever
/// `transform` does.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Movable {
    pub transform: Isometry3<f32>,
    pub update_number: u32,
}

impl Default for Movable {
    fn default() -> Self {
        Self {
            transform: Isometry3::identity(),
            update_number: 0,
        }
    }
}

impl Movable {
    pub fn new(transform: Isometry3<f32>, update_number: u32) -> Self {
        Self {
            transform,
            update_number,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.transform == Isometry3::identity()
    }
}

/// A segment hit reported by an object, in the object's own space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeamHit {
    pub point: Point3<f32>,
    /// Fraction of the way from the segment start to its end.
    pub distance: f32,
    pub polygon: Option<usize>,
}

/// A scene object the culler can track.
///
/// The culler holds objects weakly; unregister an object before dropping
/// the last strong reference to it.
pub trait VisibilityObject {
    /// Bounds in object space.
    fn object_bbox(&self) -> Aabb;

    fn movable(&self) -> Movable;

    /// Changes whenever `object_bbox` does.
    fn shape_number(&self) -> u32;

    fn mesh(&self) -> Option<MeshHandle>;

    fn flags(&self) -> VisFlags {
        VisFlags::empty()
    }

    /// Exact intersection of the object-space segment `start`-`end` with the
    /// object's geometry.
    fn hit_beam_object(&self, _start: &Point3<f32>, _end: &Point3<f32>) -> Option<BeamHit> {
        None
    }

    /// Cheaper intersection against the object's outline. Defaults to the
    /// exact test.
    fn hit_beam_outline(&self, start: &Point3<f32>, end: &Point3<f32>) -> Option<BeamHit> {
        self.hit_beam_object(start, end)
    }
}

/// Receives the objects a visibility test finds.
pub trait VisibilityCullerListener {
    fn object_visible(
        &mut self,
        object: &Rc<dyn VisibilityObject>,
        mesh: Option<MeshHandle>,
        frustum_mask: u32,
    );
}

impl<F> VisibilityCullerListener for F
where
    F: FnMut(&Rc<dyn VisibilityObject>, Option<MeshHandle>, u32),
{
    fn object_visible(
        &mut self,
        object: &Rc<dyn VisibilityObject>,
        mesh: Option<MeshHandle>,
        frustum_mask: u32,
    ) {
        self(object, mesh, frustum_mask)
    }
}

// The bounds of `object` in world space.
pub(crate) fn world_bbox(object: &dyn VisibilityObject) -> Aabb {
    let bbox = object.object_bbox();
    let movable = object.movable();
    if movable.is_identity() {
        bbox
    } else {
        bbox.transformed(&movable.transform)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Translation3;

    struct Crate;

    impl VisibilityObject for Crate {
        fn object_bbox(&self) -> Aabb {
            Aabb::new(Point3::origin(), Point3::new(1f32, 1f32, 1f32))
        }

        fn movable(&self) -> Movable {
            Movable::new(Translation3::new(10f32, 0f32, 0f32).into(), 1)
        }

        fn shape_number(&self) -> u32 {
            0
        }

        fn mesh(&self) -> Option<MeshHandle> {
            None
        }
    }

    #[test]
    fn test_world_bbox_follows_movable() {
        let bbox = world_bbox(&Crate);
        assert_eq!(bbox.min(), &Point3::new(10f32, 0f32, 0f32));
        assert_eq!(bbox.max(), &Point3::new(11f32, 1f32, 1f32));
    }

    #[test]
    fn test_defaults() {
        assert!(Crate.flags().is_empty());
        assert!(Crate
            .hit_beam_outline(&Point3::origin(), &Point3::new(1f32, 1f32, 1f32))
            .is_none());
        assert!(Movable::default().is_identity());
    }

    #[test]
    fn test_closure_listener() {
        let mut seen = Vec::new();
        {
            let mut listener = |_: &Rc<dyn VisibilityObject>, mesh: Option<MeshHandle>, mask: u32| {
                seen.push((mesh, mask))
            };
            let object: Rc<dyn VisibilityObject> = Rc::new(Crate);
            listener.object_visible(&object, Some(MeshHandle(3)), 0b101);
        }
        assert_eq!(seen, vec![(Some(MeshHandle(3)), 0b101)]);
    }
}
