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
use nalgebra::{Isometry3, Point3, Vector3};

/// An axis aligned box. An empty box has min > max on every axis so that
/// growing it by any point yields exactly that point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    min: Point3<f32>,
    max: Point3<f32>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a, I: IntoIterator<Item = &'a Point3<f32>>>(points: I) -> Self {
        let mut out = Self::empty();
        for p in points {
            out.expand_point(p);
        }
        out
    }

    pub fn min(&self) -> &Point3<f32> {
        &self.min
    }

    pub fn max(&self) -> &Point3<f32> {
        &self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn is_nan(&self) -> bool {
        self.min.coords.iter().any(|v| v.is_nan()) || self.max.coords.iter().any(|v| v.is_nan())
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::from((self.min.coords + self.max.coords) / 2f32)
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Corner `i` in 0..8; bit 0 selects max x, bit 1 max y, bit 2 max z.
    pub fn corner(&self, i: usize) -> Point3<f32> {
        Point3::new(
            if i & 1 == 0 { self.min.x } else { self.max.x },
            if i & 2 == 0 { self.min.y } else { self.max.y },
            if i & 4 == 0 { self.min.z } else { self.max.z },
        )
    }

    pub fn expand_point(&mut self, p: &Point3<f32>) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn expand_aabb(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        for i in 0..3 {
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        out.expand_aabb(other);
        out
    }

    pub fn intersection(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = self.min[i].max(other.min[i]);
            out.max[i] = self.max[i].min(other.max[i]);
        }
        out
    }

    pub fn contains_point(&self, p: &Point3<f32>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        other.is_empty()
            || (0..3).all(|i| other.min[i] >= self.min[i] && other.max[i] <= self.max[i])
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    pub fn squared_distance_to_point(&self, p: &Point3<f32>) -> f32 {
        let mut d2 = 0f32;
        for i in 0..3 {
            let v = if p[i] < self.min[i] {
                self.min[i] - p[i]
            } else if p[i] > self.max[i] {
                p[i] - self.max[i]
            } else {
                0f32
            };
            d2 += v * v;
        }
        d2
    }

    /// The box enclosing this box after it has been moved by `transform`.
    pub fn transformed(&self, transform: &Isometry3<f32>) -> Aabb {
        let mut out = Aabb::empty();
        for i in 0..8 {
            out.expand_point(&(transform * self.corner(i)));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};
    use std::f32::consts::FRAC_PI_2;

    fn unit() -> Aabb {
        Aabb::new(Point3::new(0f32, 0f32, 0f32), Point3::new(1f32, 1f32, 1f32))
    }

    #[test]
    fn test_empty_box_grows_to_point() {
        let mut b = Aabb::empty();
        assert!(b.is_empty());
        b.expand_point(&Point3::new(1f32, 2f32, 3f32));
        assert!(!b.is_empty());
        assert_eq!(b.min(), b.max());
    }

    #[test]
    fn test_union_and_containment() {
        let a = unit();
        let b = Aabb::new(Point3::new(2f32, 2f32, 2f32), Point3::new(3f32, 3f32, 3f32));
        let u = a.union(&b);
        assert!(u.contains_aabb(&a));
        assert!(u.contains_aabb(&b));
        assert!(!a.intersects(&b));
        assert!(u.intersects(&b));
        assert!(a.union(&Aabb::empty()) == a);
    }

    #[test]
    fn test_squared_distance() {
        let a = unit();
        assert_relative_eq!(a.squared_distance_to_point(&Point3::new(0.5, 0.5, 0.5)), 0f32);
        assert_relative_eq!(a.squared_distance_to_point(&Point3::new(3f32, 0.5, 0.5)), 4f32);
        assert_relative_eq!(a.squared_distance_to_point(&Point3::new(2f32, 2f32, 0.5)), 2f32);
    }

    #[test]
    fn test_transformed_box() {
        let iso = Isometry3::from_parts(
            Translation3::new(10f32, 0f32, 0f32),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2),
        );
        let b = unit().transformed(&iso);
        assert_relative_eq!(b.min().x, 10f32, epsilon = 1e-5);
        assert_relative_eq!(b.max().x, 11f32, epsilon = 1e-5);
        assert_relative_eq!(b.min().z, -1f32, epsilon = 1e-5);
        assert_relative_eq!(b.max().z, 0f32, epsilon = 1e-5);
    }
}
