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
use nalgebra::{Point3, Vector3};

/// Normal of the triangle (p0, p1, p2) with counter-clockwise winding.
pub fn compute_normal(p0: &Point3<f32>, p1: &Point3<f32>, p2: &Point3<f32>) -> Vector3<f32> {
    (p1.coords - p0.coords)
        .cross(&(p2.coords - p0.coords))
        .normalize()
}

/// Surface normal of a height field `y = f(x, z)` from its partial
/// derivatives.
pub fn height_field_normal(dy_dx: f32, dy_dz: f32) -> Vector3<f32> {
    Vector3::new(-dy_dx, 1f32, -dy_dz).normalize()
}
