//! Drawable objects.
//!
//! A drawable is a closed, tagged variant: either a mesh resident in its
//! own host-visible buffers, or a sub-range of the shared GPU arenas.
//! Command recording dispatches on the variant with a single match: no
//! open inheritance, no per-draw virtual calls, and the variant set is
//! exhaustively checked at compile time.

use std::sync::Arc;

use ash::vk;

use kiln_rhi::RhiResult;
use kiln_rhi::buffer::{Buffer, BufferUsage};
use kiln_rhi::command::CommandBuffer;
use kiln_rhi::deletion::DeletionQueue;
use kiln_rhi::device::Device;

use crate::mesh_arena::{MeshAllocation, MeshArena, MeshData};

/// A renderable mesh.
pub enum Drawable {
    /// Mesh kept in dedicated host-visible buffers, owned by the drawable.
    Resident {
        vertex_buffer: Buffer,
        index_buffer: Buffer,
        index_count: u32,
    },
    /// Mesh living in the shared arena buffers; the allocation is a value
    /// and the arena owns the storage.
    Arena(MeshAllocation),
}

impl Drawable {
    /// Creates a host-resident drawable from CPU mesh data.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the writes fail.
    pub fn new_resident(device: Arc<Device>, mesh: &MeshData) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::HostVertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            device,
            BufferUsage::HostIndex,
            bytemuck::cast_slice(&mesh.indices),
        )?;

        Ok(Drawable::Resident {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Records bind-and-draw commands for this drawable.
    ///
    /// Arena drawables bind the shared buffers at this mesh's offsets and
    /// draw each of its ranges; resident drawables bind their own buffers
    /// at offset zero. A pipeline must already be bound.
    pub fn record(&self, cmd: &CommandBuffer, arena: &MeshArena) {
        match self {
            Drawable::Resident {
                vertex_buffer,
                index_buffer,
                index_count,
            } => {
                cmd.bind_vertex_buffers(&[vertex_buffer.handle()], &[0]);
                cmd.bind_index_buffer(index_buffer.handle(), 0, vk::IndexType::UINT32);
                cmd.draw_indexed(*index_count, 1, 0, 0, 0);
            }
            Drawable::Arena(allocation) => {
                // In the device-address layout the vertex arena is a
                // storage buffer; the pipeline fetches vertices through
                // the allocation's address and only indices are bound.
                if allocation.vertex_address.is_none() {
                    cmd.bind_vertex_buffers(&[arena.vertex_buffer()], &[allocation.vertex_offset]);
                }
                cmd.bind_index_buffer(
                    arena.index_buffer(),
                    allocation.index_offset,
                    vk::IndexType::UINT32,
                );
                for range in &allocation.ranges {
                    cmd.draw_indexed(range.index_count, 1, range.first_index, 0, 0);
                }
            }
        }
    }

    /// Total number of indices this drawable draws.
    pub fn index_count(&self) -> u32 {
        match self {
            Drawable::Resident { index_count, .. } => *index_count,
            Drawable::Arena(allocation) => allocation.index_count,
        }
    }

    /// Hands any owned GPU resources to `queue` for deferred destruction.
    ///
    /// Arena drawables own nothing; their storage is reclaimed by the
    /// arena's reset.
    pub fn retire(self, queue: &mut DeletionQueue) {
        match self {
            Drawable::Resident {
                vertex_buffer,
                index_buffer,
                ..
            } => {
                let (handle, allocation) = vertex_buffer.into_parts();
                queue.add_buffer(handle, allocation);
                let (handle, allocation) = index_buffer.into_parts();
                queue.add_buffer(handle, allocation);
            }
            Drawable::Arena(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_arena::DrawRange;

    #[test]
    fn test_arena_drawable_index_count() {
        let drawable = Drawable::Arena(MeshAllocation {
            vertex_offset: 256,
            index_offset: 64,
            index_count: 36,
            ranges: vec![DrawRange {
                name: "cube".into(),
                first_index: 0,
                index_count: 36,
            }],
            vertex_address: None,
        });
        assert_eq!(drawable.index_count(), 36);
    }

    #[test]
    fn test_retiring_arena_drawable_adds_nothing() {
        let mut queue = DeletionQueue::new();
        let drawable = Drawable::Arena(MeshAllocation::default());
        drawable.retire(&mut queue);
        assert!(queue.is_empty());
    }
}
