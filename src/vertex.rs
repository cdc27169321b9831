// Vertex data and push constants shared with the shaders

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved position + color, matching `layout(location = 0/1)` in the
/// vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self {
            position: Vec3::from_array(position),
            color: Vec3::from_array(color),
        }
    }
}

/// The triangle: red at the top, green bottom-right, blue bottom-left.
/// Vulkan's clip space has +Y pointing down.
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new([0.0, -0.5, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
];

/// Per-frame values pushed to both shader stages.
///
/// Layout matches the `push_constant` block in the shaders (std430):
/// `float time; vec2 resolution;` puts `resolution` at offset 8.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub time: f32,
    pub _pad: f32,
    pub resolution: Vec2,
}

impl PushConstants {
    pub fn new(time: f32, width: u32, height: u32) -> Self {
        Self {
            time,
            _pad: 0.0,
            resolution: Vec2::new(width as f32, height as f32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn vertex_is_six_tightly_packed_floats() {
        assert_eq!(size_of::<Vertex>(), 24);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 12);
    }

    #[test]
    fn triangle_bytes_are_position_then_color() {
        let floats: &[f32] = bytemuck::cast_slice(&TRIANGLE);
        assert_eq!(floats.len(), 18);
        assert_eq!(&floats[0..6], &[0.0, -0.5, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&floats[12..18], &[-0.5, 0.5, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn push_constants_match_shader_block() {
        assert_eq!(size_of::<PushConstants>(), 16);
        assert_eq!(offset_of!(PushConstants, resolution), 8);
        let pc = PushConstants::new(1.5, 800, 600);
        assert_eq!(pc.resolution, Vec2::new(800.0, 600.0));
    }

    #[test]
    fn red_vertex_is_on_top() {
        // Smallest y is the top of the screen in Vulkan clip space
        let top = TRIANGLE
            .iter()
            .min_by(|a, b| a.position.y.total_cmp(&b.position.y))
            .unwrap();
        assert_eq!(top.color, Vec3::new(1.0, 0.0, 0.0));

        let green = TRIANGLE[1].position;
        let blue = TRIANGLE[2].position;
        assert!(green.y > top.position.y && green.x > 0.0);
        assert!(blue.y > top.position.y && blue.x < 0.0);
    }
}
