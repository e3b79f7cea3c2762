//! Vertex data layout.
//!
//! One vertex format is shared by everything the arenas hold. The struct is
//! 48 bytes and 16-byte aligned chunks pack cleanly against the arena's
//! 16-byte allocation alignment.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Standard mesh vertex: position, normal, UV, tangent.
///
/// # Memory Layout
///
/// `#[repr(C)]`, total 48 bytes:
/// - offset 0: position (12 bytes)
/// - offset 12: normal (12 bytes)
/// - offset 24: tex_coord (8 bytes)
/// - offset 32: tangent (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space.
    pub position: Vec3,
    /// Surface normal (normalized).
    pub normal: Vec3,
    /// Texture coordinates.
    pub tex_coord: Vec2,
    /// Tangent with handedness in w.
    pub tangent: Vec4,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2, tangent: Vec4) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent,
        }
    }

    /// Size of one vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Vertex input binding description for the classic (non-device-address)
    /// arena layout.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Vertex attribute descriptions matching the struct layout.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 3,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(Vertex::size(), 48);
    }

    #[test]
    fn test_vertex_offsets_match_attributes() {
        use std::mem::offset_of;

        let attrs = Vertex::attribute_descriptions();
        assert_eq!(offset_of!(Vertex, position), attrs[0].offset as usize);
        assert_eq!(offset_of!(Vertex, normal), attrs[1].offset as usize);
        assert_eq!(offset_of!(Vertex, tex_coord), attrs[2].offset as usize);
        assert_eq!(offset_of!(Vertex, tangent), attrs[3].offset as usize);
    }

    #[test]
    fn test_vertex_binding_stride() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 48);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_byte_cast_round_trip() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::Y,
            Vec2::new(0.5, 0.5),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 48);

        let back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(back.position, vertex.position);
        assert_eq!(back.tangent, vertex.tangent);
    }
}
