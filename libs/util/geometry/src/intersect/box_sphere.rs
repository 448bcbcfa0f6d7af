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
use crate::{Aabb, Sphere};

pub fn box_sphere(aabb: &Aabb, sphere: &Sphere) -> bool {
    !aabb.is_empty() && aabb.squared_distance_to_point(sphere.center()) <= sphere.radius_squared()
}

/// True if every corner of the box lies within the sphere.
pub fn box_inside_sphere(aabb: &Aabb, sphere: &Sphere) -> bool {
    (0..8).all(|i| (aabb.corner(i) - sphere.center()).magnitude_squared() <= sphere.radius_squared())
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_box_sphere() {
        let aabb = Aabb::new(Point3::new(0f32, 0f32, 0f32), Point3::new(1f32, 1f32, 1f32));
        let near = Sphere::from_center_and_radius(&Point3::new(2f32, 0.5, 0.5), 1.5);
        let far = Sphere::from_center_and_radius(&Point3::new(3f32, 3f32, 3f32), 1f32);
        let big = Sphere::from_center_and_radius(&Point3::new(0.5f32, 0.5, 0.5), 2f32);
        assert!(box_sphere(&aabb, &near));
        assert!(!box_sphere(&aabb, &far));
        assert!(!box_inside_sphere(&aabb, &near));
        assert!(box_inside_sphere(&aabb, &big));
    }
}
