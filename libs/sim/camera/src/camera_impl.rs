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
use geometry::{Frustum, Plane};
use log::trace;
use nalgebra::{Isometry3, Perspective3, Point3, RowVector4, Vector3};

pub struct Camera {
    // Camera parameters
    fov_y: f32,
    aspect_ratio: f32,
    z_near: f32,
    z_far: f32,

    // Camera view state.
    position: Point3<f32>,
    forward: Vector3<f32>,
    up: Vector3<f32>,
    right: Vector3<f32>,
}

impl Camera {
    /// `fov_y` is in radians; `aspect_ratio` is width over height.
    pub fn from_parameters(fov_y: f32, aspect_ratio: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            fov_y,
            aspect_ratio,
            z_near,
            z_far,

            position: Point3::origin(),
            forward: Vector3::new(0f32, 0f32, -1f32),
            up: Vector3::new(0f32, 1f32, 0f32),
            right: Vector3::new(1f32, 0f32, 0f32),
        }
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn z_near(&self) -> f32 {
        self.z_near
    }

    pub fn z_far(&self) -> f32 {
        self.z_far
    }

    pub fn position(&self) -> &Point3<f32> {
        &self.position
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
    }

    pub fn forward(&self) -> &Vector3<f32> {
        &self.forward
    }

    pub fn up(&self) -> &Vector3<f32> {
        &self.up
    }

    pub fn right(&self) -> &Vector3<f32> {
        &self.right
    }

    /// Point the camera along `forward`, keeping `up` as close to the given
    /// vector as the new direction allows.
    pub fn set_orientation(&mut self, forward: &Vector3<f32>, up: &Vector3<f32>) {
        self.forward = forward.normalize();
        self.right = self.forward.cross(up).normalize();
        self.up = self.right.cross(&self.forward);
    }

    pub fn look_at(&mut self, target: &Point3<f32>, up: &Vector3<f32>) {
        let forward = target - self.position;
        self.set_orientation(&forward, up);
    }

    pub fn projection(&self) -> Perspective3<f32> {
        Perspective3::new(self.aspect_ratio, self.fov_y, self.z_near, self.z_far)
    }

    pub fn view(&self) -> Isometry3<f32> {
        Isometry3::look_at_rh(&self.position, &(self.position + self.forward), &self.up)
    }

    /// The six clip planes of the view volume in world space, inward facing,
    /// in the order left, right, bottom, top, near, far.
    pub fn world_space_frustum(&self) -> Frustum {
        // Taken from this paper:
        //   https://www.gamedevs.org/uploads/fast-extraction-viewing-frustum-planes-from-world-view-projection-matrix.pdf
        let m = self.projection().as_matrix() * self.view().to_homogeneous();
        let plane = |row: RowVector4<f32>| Plane::from_coefficients(row[0], row[1], row[2], row[3]);

        let left = plane(m.row(3) + m.row(0));
        let right = plane(m.row(3) - m.row(0));
        let bottom = plane(m.row(3) + m.row(1));
        let top = plane(m.row(3) - m.row(1));
        let near = plane(m.row(3) + m.row(2));
        let far = plane(m.row(3) - m.row(2));
        trace!("frustum at {:?} facing {:?}", self.position, self.forward);

        Frustum::from_planes([left, right, bottom, top, near, far])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use geometry::Aabb;
    use std::f32::consts::FRAC_PI_2;

    fn camera_looking_down_z(z_far: f32) -> Camera {
        let mut camera = Camera::from_parameters(FRAC_PI_2, 1f32, 1f32, z_far);
        camera.set_position(Point3::new(5f32, 5f32, -100f32));
        camera.set_orientation(&Vector3::new(0f32, 0f32, 1f32), &Vector3::y());
        camera
    }

    fn cube() -> Aabb {
        Aabb::new(Point3::new(0f32, 0f32, 0f32), Point3::new(10f32, 10f32, 10f32))
    }

    #[test]
    fn test_orientation_is_orthonormal() {
        let camera = camera_looking_down_z(150f32);
        assert_relative_eq!(camera.right().dot(camera.up()), 0f32);
        assert_relative_eq!(camera.right().dot(camera.forward()), 0f32);
        assert_relative_eq!(*camera.up(), Vector3::y());
    }

    #[test]
    fn test_frustum_planes_face_inward() {
        let camera = camera_looking_down_z(150f32);
        let frustum = camera.world_space_frustum();
        assert_eq!(frustum.len(), 6);
        assert!(frustum.contains_point(&Point3::new(5f32, 5f32, 0f32)));
        assert!(!frustum.contains_point(&Point3::new(5f32, 5f32, -200f32)));
        assert!(!frustum.contains_point(&Point3::new(5f32, 5f32, 100f32)));

        let far = frustum.planes()[5];
        assert_relative_eq!(
            far.distance_to_point(&Point3::new(5f32, 5f32, 50f32)),
            0f32,
            epsilon = 1e-2
        );
    }

    #[test]
    fn test_box_before_far_plane_is_visible() {
        let frustum = camera_looking_down_z(150f32).world_space_frustum();
        assert!(frustum.test_aabb(&cube(), frustum.all_mask()).is_some());
    }

    #[test]
    fn test_box_beyond_far_plane_is_invisible() {
        let frustum = camera_looking_down_z(50f32).world_space_frustum();
        assert!(frustum.test_aabb(&cube(), frustum.all_mask()).is_none());
    }
}
