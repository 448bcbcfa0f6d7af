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
use camera::Camera;
use geometry::{Aabb, Frustum};
use nalgebra::Point3;

/// What a frustum visibility test looks from: the eye, the clip planes and
/// the mask of planes that still need testing.
#[derive(Clone, Debug)]
pub struct RenderView {
    origin: Point3<f32>,
    frustum: Frustum,
    mask: u32,
}

impl RenderView {
    pub fn new(origin: Point3<f32>, frustum: Frustum) -> Self {
        let mask = frustum.all_mask();
        Self {
            origin,
            frustum,
            mask,
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self::new(*camera.position(), camera.world_space_frustum())
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask & self.frustum.all_mask();
        self
    }

    pub fn origin(&self) -> &Point3<f32> {
        &self.origin
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Classify a kd-tree node's box against the planes in `mask`.
    pub fn test_node(&self, bbox: &Aabb, mask: u32) -> NodeTest {
        if bbox.is_empty() {
            NodeTest::Invisible
        } else if bbox.contains_point(&self.origin) {
            NodeTest::Inside
        } else {
            match self.frustum.test_aabb(bbox, mask) {
                Some(mask) => NodeTest::Visible(mask),
                None => NodeTest::Invisible,
            }
        }
    }

    /// The mask to report an object with, if its box is visible at all.
    pub fn test_object(&self, bbox: &Aabb, mask: u32) -> Option<u32> {
        if bbox.is_empty() {
            None
        } else if bbox.contains_point(&self.origin) {
            Some(mask)
        } else {
            self.frustum.test_aabb(bbox, mask)
        }
    }
}

/// Outcome of testing a kd-tree node against a view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeTest {
    /// The eye is inside the node; the mask is left as it was.
    Inside,
    /// Some part of the node may be visible. Carries the narrowed mask,
    /// which is 0 when the node is entirely inside the frustum.
    Visible(u32),
    Invisible,
}
