use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Perspective projection with Y flipped, since Vulkan clip space has its
    /// origin at the top left.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Per-frame transforms bound at descriptor binding 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// `time` is seconds since start; the model spins about Z at 90° per second.
    pub fn new(camera: &Camera, time: f32, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        Self {
            model: Mat4::from_rotation_z(time * 90f32.to_radians()),
            view: camera.view(),
            proj: camera.projection(aspect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_ubo_layout() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 192);
        let ubo = UniformBufferObject::new(&Camera::default(), 0.0, 800, 600);
        assert_eq!(bytemuck::bytes_of(&ubo).len(), 192);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let flipped = camera.projection(1.0);
        let plain = Mat4::perspective_rh(camera.fov_y, 1.0, camera.near, camera.far);
        assert_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_eq!(flipped.x_axis, plain.x_axis);

        // A point above the target lands in the upper half of the image.
        let ubo = UniformBufferObject::new(&camera, 0.0, 100, 100);
        let clip = ubo.proj * ubo.view * Vec4::new(0.0, 0.0, 0.5, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_depth_range() {
        let camera = Camera::default();
        let proj = camera.projection(1.0);
        let near = proj * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_model_rotates_quarter_turn_per_second() {
        let ubo = UniformBufferObject::new(&Camera::default(), 1.0, 800, 600);
        let x = ubo.model.transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_zero_height_does_not_divide_by_zero() {
        let ubo = UniformBufferObject::new(&Camera::default(), 0.0, 800, 0);
        assert!(ubo.proj.is_finite());
    }
}
