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
use crate::{Aabb, Segment};

/// Slab test of a segment against a box. Returns the segment parameter in
/// `[0, 1]` of the first point inside the box, which is 0 when the segment
/// starts inside.
pub fn box_segment(aabb: &Aabb, segment: &Segment) -> Option<f32> {
    if aabb.is_empty() {
        return None;
    }
    let start = segment.start();
    let delta = segment.delta();
    let mut t_enter = 0f32;
    let mut t_exit = 1f32;
    for i in 0..3 {
        let lo = aabb.min()[i];
        let hi = aabb.max()[i];
        if delta[i].abs() < f32::EPSILON {
            if start[i] < lo || start[i] > hi {
                return None;
            }
            continue;
        }
        let inv = 1f32 / delta[i];
        let mut t0 = (lo - start[i]) * inv;
        let mut t1 = (hi - start[i]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_enter = t_enter.max(t0);
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }
    Some(t_enter)
}
