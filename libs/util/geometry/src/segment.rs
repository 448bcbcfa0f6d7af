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

/// A finite line segment between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    start: Point3<f32>,
    end: Point3<f32>,
}

impl Segment {
    pub fn new(start: Point3<f32>, end: Point3<f32>) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> &Point3<f32> {
        &self.start
    }

    pub fn end(&self) -> &Point3<f32> {
        &self.end
    }

    pub fn delta(&self) -> Vector3<f32> {
        self.end - self.start
    }

    pub fn length(&self) -> f32 {
        self.delta().magnitude()
    }

    /// The point at parameter `t`, where 0 is `start` and 1 is `end`.
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.start + self.delta() * t
    }
}
