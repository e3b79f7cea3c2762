//! Renderer error type.

use thiserror::Error;

use kiln_rhi::RhiError;

use crate::mesh_arena::ArenaError;

/// Errors surfaced by the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device/API failure from the RHI layer.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Mesh arena failure (out of space, or a device failure during upload).
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// Platform/window failure.
    #[error(transparent)]
    Platform(#[from] kiln_core::Error),
}

impl RenderError {
    /// Whether the error is in the unrecoverable category (lost device,
    /// failed submit). Fatal errors should terminate the application after
    /// a diagnostic; everything else is handled or reported locally.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::Rhi(e) => e.is_fatal(),
            RenderError::Arena(ArenaError::Rhi(e)) => e.is_fatal(),
            RenderError::Arena(ArenaError::OutOfSpace { .. }) => false,
            RenderError::Platform(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_space_is_recoverable() {
        let err = RenderError::Arena(ArenaError::OutOfSpace {
            vertex_bytes: 100,
            index_bytes: 10,
            vertex_free: 0,
            index_free: 0,
        });
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_device_loss_is_fatal() {
        let err = RenderError::Rhi(RhiError::DeviceLost("fence timeout".into()));
        assert!(err.is_fatal());
    }
}
