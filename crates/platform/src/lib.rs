//! Platform integration: windowing and surface creation.
//!
//! External collaborator of the rendering engine: the renderer consumes a
//! window and a surface through this crate's narrow interface and never
//! touches winit directly.

mod window;

pub use window::{Surface, Window};
