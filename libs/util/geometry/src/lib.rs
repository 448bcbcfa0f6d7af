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
mod aabb;
pub mod algorithm;
mod frustum;
pub mod intersect;
mod plane;
mod segment;
mod sphere;

pub use aabb::Aabb;
pub use frustum::{Frustum, MAX_FRUSTUM_PLANES};
pub use plane::Plane;
pub use segment::Segment;
pub use sphere::Sphere;
