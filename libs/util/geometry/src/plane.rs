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
use crate::Aabb;
use nalgebra::{Point3, Vector3};

const ON_PLANE_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    normal: Vector3<f32>,
    distance: f32,
}

impl Plane {
    pub fn xy() -> Self {
        Self {
            normal: Vector3::new(0f32, 0f32, 1f32),
            distance: 0f32,
        }
    }

    pub fn yz() -> Self {
        Self {
            normal: Vector3::new(1f32, 0f32, 0f32),
            distance: 0f32,
        }
    }

    pub fn xz() -> Self {
        Self {
            normal: Vector3::new(0f32, 1f32, 0f32),
            distance: 0f32,
        }
    }

    pub fn from_point_and_normal(p: &Point3<f32>, n: &Vector3<f32>) -> Self {
        Self {
            normal: n.to_owned(),
            distance: p.coords.dot(n),
        }
    }

    pub fn from_normal_and_distance(normal: Vector3<f32>, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Build from the (a, b, c, d) coefficients of `ax + by + cz + d = 0`,
    /// normalizing so that distances are in world units.
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vector3::new(a, b, c);
        let m = normal.magnitude();
        Self {
            normal: normal / m,
            distance: -d / m,
        }
    }

    pub fn point_on_plane(&self, p: &Point3<f32>) -> bool {
        self.distance_to_point(p).abs() <= ON_PLANE_EPSILON
    }

    pub fn distance_to_point(&self, p: &Point3<f32>) -> f32 {
        self.normal.dot(&p.coords) - self.distance
    }

    pub fn closest_point_on_plane(&self, p: &Point3<f32>) -> Point3<f32> {
        p - (self.normal * self.distance_to_point(p))
    }

    pub fn point_is_in_front(&self, p: &Point3<f32>) -> bool {
        self.distance_to_point(p) >= 0f32
    }

    pub fn point_is_in_front_with_offset(&self, p: &Point3<f32>, offset: f32) -> bool {
        self.distance_to_point(p) >= offset
    }

    // The corner of the box furthest along the normal: if even this is behind
    // the plane, the whole box is.
    pub fn positive_vertex(&self, aabb: &Aabb) -> Point3<f32> {
        let mut p = *aabb.min();
        for i in 0..3 {
            if self.normal[i] >= 0f32 {
                p[i] = aabb.max()[i];
            }
        }
        p
    }

    pub fn negative_vertex(&self, aabb: &Aabb) -> Point3<f32> {
        let mut p = *aabb.max();
        for i in 0..3 {
            if self.normal[i] >= 0f32 {
                p[i] = aabb.min()[i];
            }
        }
        p
    }

    pub fn normal(&self) -> &Vector3<f32> {
        &self.normal
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn d(&self) -> f32 {
        -self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_on_plane() {
        let plane = Plane::from_point_and_normal(
            &Point3::new(0f32, 0f32, 0f32),
            &Vector3::new(0f32, 0f32, 1f32),
        );
        assert!(plane.point_on_plane(&Point3::new(10f32, 10f32, 0f32)));
        assert!(!plane.point_on_plane(&Point3::new(10f32, 10f32, 0.1f32)));
        assert!(!plane.point_on_plane(&Point3::new(10f32, 10f32, -0.1f32)));
    }

    #[test]
    fn test_point_distance() {
        let plane = Plane::from_point_and_normal(
            &Point3::new(0f32, 0f32, 0f32),
            &Vector3::new(0f32, 0f32, 1f32),
        );

        assert_relative_eq!(
            -1f32,
            plane.distance_to_point(&Point3::new(1f32, 1f32, -1f32))
        );
        assert_relative_eq!(
            1f32,
            plane.distance_to_point(&Point3::new(-1f32, -1f32, 1f32))
        );
    }

    #[test]
    fn test_closest_point_on_plane() {
        let plane = Plane::from_point_and_normal(
            &Point3::new(0f32, 0f32, 0f32),
            &Vector3::new(0f32, 0f32, 1f32),
        );

        assert_relative_eq!(
            Point3::new(1f32, 1f32, 0f32),
            plane.closest_point_on_plane(&Point3::new(1f32, 1f32, -1f32))
        );
        assert_relative_eq!(
            Point3::new(-1f32, -1f32, 0f32),
            plane.closest_point_on_plane(&Point3::new(-1f32, -1f32, 1f32))
        );
    }

    #[test]
    fn test_coefficients_are_normalized() {
        let plane = Plane::from_coefficients(0f32, 0f32, 2f32, -4f32);
        assert_relative_eq!(plane.normal().magnitude(), 1f32);
        assert_relative_eq!(plane.distance(), 2f32);
        assert!(plane.point_on_plane(&Point3::new(5f32, -3f32, 2f32)));
    }

    #[test]
    fn test_box_extreme_vertices() {
        let plane = Plane::from_point_and_normal(
            &Point3::new(0f32, 0f32, 0f32),
            &Vector3::new(1f32, 0f32, -1f32).normalize(),
        );
        let aabb = Aabb::new(Point3::new(-1f32, -2f32, -3f32), Point3::new(1f32, 2f32, 3f32));
        assert_eq!(plane.positive_vertex(&aabb), Point3::new(1f32, 2f32, -3f32));
        assert_eq!(plane.negative_vertex(&aabb), Point3::new(-1f32, -2f32, 3f32));
    }
}
