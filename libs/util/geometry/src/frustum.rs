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
use crate::{Aabb, Plane};
use smallvec::SmallVec;

/// Active-plane masks are 32 bits wide.
pub const MAX_FRUSTUM_PLANES: usize = 32;

/// A convex volume bounded by inward facing planes. Each plane owns one bit
/// of a clip mask; a set bit means the plane still needs testing.
#[derive(Clone, Debug, Default)]
pub struct Frustum {
    planes: SmallVec<[Plane; 6]>,
}

impl Frustum {
    /// Planes past the 32nd are ignored.
    pub fn from_planes<I: IntoIterator<Item = Plane>>(planes: I) -> Self {
        Self {
            planes: planes.into_iter().take(MAX_FRUSTUM_PLANES).collect(),
        }
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn all_mask(&self) -> u32 {
        if self.planes.len() >= MAX_FRUSTUM_PLANES {
            u32::MAX
        } else {
            (1u32 << self.planes.len()) - 1
        }
    }

    pub fn contains_point(&self, p: &nalgebra::Point3<f32>) -> bool {
        self.planes.iter().all(|plane| plane.point_is_in_front(p))
    }

    /// Classify `aabb` against the planes selected by `mask`. See
    /// [`crate::intersect::box_frustum`].
    pub fn test_aabb(&self, aabb: &Aabb, mask: u32) -> Option<u32> {
        crate::intersect::box_frustum(aabb, &self.planes, mask)
    }
}
