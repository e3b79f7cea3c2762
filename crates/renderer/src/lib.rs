//! Rendering orchestration.
//!
//! This crate owns the frame loop and the GPU-side resource lifecycle
//! built on top of `kiln-rhi`:
//! - Frame synchronization ring (frames in flight)
//! - Shared mesh arena with bump allocation and synchronous upload
//! - Tagged-variant drawables
//! - The renderer tying surface, ring, and arena together

pub mod drawable;
mod error;
pub mod frame;
pub mod mesh_arena;
pub mod renderer;

pub use drawable::Drawable;
pub use error::RenderError;
pub use frame::{DEFAULT_FRAME_OVERLAP, FrameRing, FrameSlot, SlotPolicy};
pub use mesh_arena::{ArenaError, DrawRange, MeshAllocation, MeshArena, MeshData};
pub use renderer::Renderer;

// Re-exported so collaborators can build mesh data without depending on
// the RHI crate directly.
pub use kiln_rhi::vertex::Vertex;
