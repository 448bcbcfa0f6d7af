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

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PlaneSide {
    Above,
    Straddling,
    Below,
}

impl PlaneSide {
    pub fn classify(aabb: &Aabb, plane: &Plane) -> Self {
        if plane.distance_to_point(&plane.positive_vertex(aabb)) < 0f32 {
            PlaneSide::Below
        } else if plane.distance_to_point(&plane.negative_vertex(aabb)) >= 0f32 {
            PlaneSide::Above
        } else {
            PlaneSide::Straddling
        }
    }
}

/// Test `aabb` against every plane whose bit is set in `mask`.
///
/// Returns `None` if the box is entirely behind any tested plane. Otherwise
/// returns the narrowed mask: bits are cleared for planes the box lies
/// entirely in front of, so a result of 0 means the box is completely inside.
pub fn box_frustum(aabb: &Aabb, planes: &[Plane], mask: u32) -> Option<u32> {
    let mut out = mask;
    for (i, plane) in planes.iter().enumerate().take(32) {
        let bit = 1u32 << i;
        if mask & bit == 0 {
            continue;
        }
        match PlaneSide::classify(aabb, plane) {
            PlaneSide::Below => return None,
            PlaneSide::Above => out &= !bit,
            PlaneSide::Straddling => {}
        }
    }
    Some(out)
}
