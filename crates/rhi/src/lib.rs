//! Vulkan abstraction layer.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It carries the resource-lifecycle machinery the rest of the engine is
//! built on:
//! - Instance and device creation
//! - Type-bucketed deferred destruction ([`deletion::DeletionQueue`])
//! - Swapchain build/recreate with its own deletion queue
//! - Command buffer recording and one-shot immediate submission
//! - Buffer management and synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod deletion;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod swapchain;
pub mod sync;
pub mod upload;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
