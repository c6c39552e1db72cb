use glam::{Mat4, Vec3};
use shared::UniformBufferObject;

/// Closest the camera may get to the origin along its view axis.
pub const MIN_ZOOM_DISTANCE: f32 = 0.5;
/// Farthest the camera may back away. Stays inside the far plane.
pub const MAX_ZOOM_DISTANCE: f32 = 200.0;

/// Camera that spins the scene around the origin and looks at it from a distance.
///
/// `rotation` holds Euler angles in degrees applied to the model as `Rx * Ry * Rz`,
/// `zoom` is the (negative) translation of the view along Z.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    pub rotation: Vec3,
    pub zoom: f32,
    pub fov_y_degrees: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub rotation_speed: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            rotation: Vec3::new(25.0, -35.0, 0.0),
            zoom: -30.0,
            fov_y_degrees: 60.0,
            z_near: 0.1,
            z_far: 256.0,
            rotation_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

impl OrbitCamera {
    /// Applies a pointer drag of (`dx`, `dy`) pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.rotation.x += dy * 1.25 * self.rotation_speed;
        self.rotation.y -= dx * 1.25 * self.rotation_speed;
    }

    /// Moves the camera along its view axis. Positive `delta` moves closer.
    pub fn zoom_by(&mut self, delta: f32) {
        self.zoom = (self.zoom + delta * self.zoom_speed)
            .clamp(-MAX_ZOOM_DISTANCE, -MIN_ZOOM_DISTANCE);
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            aspect,
            self.z_near,
            self.z_far,
        );
        // Vulkan clip space has +Y pointing down.
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 0.0, self.zoom))
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_rotation_x(self.rotation.x.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_z(self.rotation.z.to_radians())
    }

    /// Transform block for a render target of `width` x `height` pixels.
    pub fn uniform(&self, width: u32, height: u32) -> UniformBufferObject {
        UniformBufferObject {
            projection: self.projection(aspect_ratio(width, height)),
            model: self.model(),
            view: self.view(),
        }
    }
}

/// Width over height, or 1.0 for a degenerate target.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn drag_rotates_around_x_and_y() {
        let mut camera = OrbitCamera {
            rotation: Vec3::ZERO,
            ..Default::default()
        };
        camera.rotate(4.0, 2.0);
        assert_relative_eq!(camera.rotation.x, 2.5);
        assert_relative_eq!(camera.rotation.y, -5.0);
        assert_relative_eq!(camera.rotation.z, 0.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = OrbitCamera::default();
        camera.zoom_by(1000.0);
        assert_relative_eq!(camera.zoom, -MIN_ZOOM_DISTANCE);
        camera.zoom_by(-1000.0);
        assert_relative_eq!(camera.zoom, -MAX_ZOOM_DISTANCE);
    }

    #[test]
    fn projection_maps_depth_to_unit_range() {
        let camera = OrbitCamera::default();
        let projection = camera.projection(16.0 / 9.0);

        let near = projection * Vec4::new(0.0, 0.0, -camera.z_near, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, -camera.z_far, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let camera = OrbitCamera::default();
        let clip = camera.projection(1.0) * Vec4::new(0.0, 1.0, -5.0, 1.0);
        assert!(clip.y < 0.0);
    }

    #[test]
    fn view_translates_by_zoom() {
        let camera = OrbitCamera {
            zoom: -12.0,
            ..Default::default()
        };
        let origin = camera.view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(origin.z, -12.0);
    }

    #[test]
    fn model_applies_x_rotation_first() {
        let camera = OrbitCamera {
            rotation: Vec3::new(90.0, 0.0, 0.0),
            ..Default::default()
        };
        let up = camera.model() * Vec4::new(0.0, 1.0, 0.0, 0.0);
        assert_relative_eq!(up.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(up.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_extent_keeps_matrices_finite() {
        let ubo = OrbitCamera::default().uniform(800, 0);
        assert!(ubo.projection.is_finite());
        assert_relative_eq!(aspect_ratio(1280, 720), 1280.0 / 720.0);
        assert_relative_eq!(aspect_ratio(0, 720), 1.0);
    }
}
