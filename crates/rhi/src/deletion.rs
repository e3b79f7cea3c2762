//! Type-bucketed deferred destruction.
//!
//! GPU objects can never be destroyed while in-flight work still references
//! them, so owners don't destroy handles directly: they push them into a
//! [`DeletionQueue`] and flush it at a point where the device is known to
//! be idle. The engine keeps several queues with distinct lifetimes: one
//! per frame slot (flushed when that slot's fence signals), one inside the
//! swapchain (flushed on recreate), one inside the mesh arena (flushed on
//! reset), and one engine-global (flushed at shutdown).
//!
//! The queue itself performs no synchronization; idling the device (or
//! waiting on the relevant fences) is the caller's job.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;

/// Handle kinds the queue can hold, one bucket each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Pipeline,
    PipelineLayout,
    DescriptorPool,
    DescriptorSetLayout,
    ShaderModule,
    Framebuffer,
    ImageView,
    Sampler,
    CommandPool,
    Semaphore,
    Fence,
    Buffer,
    Image,
}

/// The fixed cross-bucket destruction order.
///
/// Objects are destroyed only after everything that could reference them:
/// pipelines before their layouts, framebuffers before the views they
/// attach, views before the buffers/images backing them. Insertion order
/// never changes this; within a bucket, entries are destroyed
/// most-recently-added first to mirror create/destroy nesting.
pub const DESTROY_ORDER: [ResourceKind; 13] = [
    ResourceKind::Pipeline,
    ResourceKind::PipelineLayout,
    ResourceKind::DescriptorPool,
    ResourceKind::DescriptorSetLayout,
    ResourceKind::ShaderModule,
    ResourceKind::Framebuffer,
    ResourceKind::ImageView,
    ResourceKind::Sampler,
    ResourceKind::CommandPool,
    ResourceKind::Semaphore,
    ResourceKind::Fence,
    ResourceKind::Buffer,
    ResourceKind::Image,
];

/// A type-bucketed destroy list.
///
/// `add_*` on a null handle is a no-op; otherwise it appends to that type's
/// bucket in O(1) (use [`DeletionQueue::reserve`] ahead of hot loops).
/// [`DeletionQueue::flush`] destroys everything in [`DESTROY_ORDER`] and
/// leaves the queue empty and reusable; flushing an empty queue is a safe
/// no-op. The queue does not hold a device reference; one is supplied at
/// flush time, which also keeps the bookkeeping testable host-side.
#[derive(Default)]
pub struct DeletionQueue {
    pipelines: Vec<vk::Pipeline>,
    pipeline_layouts: Vec<vk::PipelineLayout>,
    descriptor_pools: Vec<vk::DescriptorPool>,
    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    shader_modules: Vec<vk::ShaderModule>,
    framebuffers: Vec<vk::Framebuffer>,
    image_views: Vec<vk::ImageView>,
    samplers: Vec<vk::Sampler>,
    command_pools: Vec<vk::CommandPool>,
    semaphores: Vec<vk::Semaphore>,
    fences: Vec<vk::Fence>,
    buffers: Vec<(vk::Buffer, Allocation)>,
    images: Vec<(vk::Image, Allocation)>,
}

impl DeletionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves capacity in every bucket to avoid reallocation in hot
    /// paths (e.g. enqueueing a framebuffer per swap image).
    pub fn reserve(&mut self, n: usize) {
        self.pipelines.reserve(n);
        self.pipeline_layouts.reserve(n);
        self.descriptor_pools.reserve(n);
        self.descriptor_set_layouts.reserve(n);
        self.shader_modules.reserve(n);
        self.framebuffers.reserve(n);
        self.image_views.reserve(n);
        self.samplers.reserve(n);
        self.command_pools.reserve(n);
        self.semaphores.reserve(n);
        self.fences.reserve(n);
        self.buffers.reserve(n);
        self.images.reserve(n);
    }

    pub fn add_pipeline(&mut self, p: vk::Pipeline) {
        if p != vk::Pipeline::null() {
            self.pipelines.push(p);
        }
    }

    pub fn add_pipeline_layout(&mut self, l: vk::PipelineLayout) {
        if l != vk::PipelineLayout::null() {
            self.pipeline_layouts.push(l);
        }
    }

    pub fn add_descriptor_pool(&mut self, p: vk::DescriptorPool) {
        if p != vk::DescriptorPool::null() {
            self.descriptor_pools.push(p);
        }
    }

    pub fn add_descriptor_set_layout(&mut self, l: vk::DescriptorSetLayout) {
        if l != vk::DescriptorSetLayout::null() {
            self.descriptor_set_layouts.push(l);
        }
    }

    pub fn add_shader_module(&mut self, m: vk::ShaderModule) {
        if m != vk::ShaderModule::null() {
            self.shader_modules.push(m);
        }
    }

    pub fn add_framebuffer(&mut self, f: vk::Framebuffer) {
        if f != vk::Framebuffer::null() {
            self.framebuffers.push(f);
        }
    }

    pub fn add_image_view(&mut self, v: vk::ImageView) {
        if v != vk::ImageView::null() {
            self.image_views.push(v);
        }
    }

    pub fn add_sampler(&mut self, s: vk::Sampler) {
        if s != vk::Sampler::null() {
            self.samplers.push(s);
        }
    }

    pub fn add_command_pool(&mut self, p: vk::CommandPool) {
        if p != vk::CommandPool::null() {
            self.command_pools.push(p);
        }
    }

    pub fn add_semaphore(&mut self, s: vk::Semaphore) {
        if s != vk::Semaphore::null() {
            self.semaphores.push(s);
        }
    }

    pub fn add_fence(&mut self, f: vk::Fence) {
        if f != vk::Fence::null() {
            self.fences.push(f);
        }
    }

    /// Enqueues a buffer together with its memory allocation.
    pub fn add_buffer(&mut self, b: vk::Buffer, allocation: Allocation) {
        // A null buffer never carries a live allocation; the pair is
        // dropped whole in that case.
        if b != vk::Buffer::null() {
            self.buffers.push((b, allocation));
        }
    }

    /// Enqueues an image together with its memory allocation.
    pub fn add_image(&mut self, i: vk::Image, allocation: Allocation) {
        if i != vk::Image::null() {
            self.images.push((i, allocation));
        }
    }

    /// Number of handles pending in the bucket for `kind`.
    pub fn pending(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Pipeline => self.pipelines.len(),
            ResourceKind::PipelineLayout => self.pipeline_layouts.len(),
            ResourceKind::DescriptorPool => self.descriptor_pools.len(),
            ResourceKind::DescriptorSetLayout => self.descriptor_set_layouts.len(),
            ResourceKind::ShaderModule => self.shader_modules.len(),
            ResourceKind::Framebuffer => self.framebuffers.len(),
            ResourceKind::ImageView => self.image_views.len(),
            ResourceKind::Sampler => self.samplers.len(),
            ResourceKind::CommandPool => self.command_pools.len(),
            ResourceKind::Semaphore => self.semaphores.len(),
            ResourceKind::Fence => self.fences.len(),
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::Image => self.images.len(),
        }
    }

    /// Total number of handles pending across all buckets.
    pub fn len(&self) -> usize {
        DESTROY_ORDER.iter().map(|&k| self.pending(k)).sum()
    }

    /// Whether every bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every pending handle and clears all buckets.
    ///
    /// Buckets are processed in [`DESTROY_ORDER`], each walked in reverse
    /// insertion order. The caller must guarantee no in-flight GPU work
    /// references any of these objects; this method does not wait for
    /// anything. Individual destroy calls cannot fail.
    pub fn flush(&mut self, device: &Device) {
        if self.is_empty() {
            return;
        }

        let count = self.len();
        let d = device.handle();

        for kind in DESTROY_ORDER {
            match kind {
                ResourceKind::Pipeline => {
                    for p in self.pipelines.drain(..).rev() {
                        unsafe { d.destroy_pipeline(p, None) };
                    }
                }
                ResourceKind::PipelineLayout => {
                    for l in self.pipeline_layouts.drain(..).rev() {
                        unsafe { d.destroy_pipeline_layout(l, None) };
                    }
                }
                ResourceKind::DescriptorPool => {
                    for p in self.descriptor_pools.drain(..).rev() {
                        unsafe { d.destroy_descriptor_pool(p, None) };
                    }
                }
                ResourceKind::DescriptorSetLayout => {
                    for l in self.descriptor_set_layouts.drain(..).rev() {
                        unsafe { d.destroy_descriptor_set_layout(l, None) };
                    }
                }
                ResourceKind::ShaderModule => {
                    for m in self.shader_modules.drain(..).rev() {
                        unsafe { d.destroy_shader_module(m, None) };
                    }
                }
                ResourceKind::Framebuffer => {
                    for f in self.framebuffers.drain(..).rev() {
                        unsafe { d.destroy_framebuffer(f, None) };
                    }
                }
                ResourceKind::ImageView => {
                    for v in self.image_views.drain(..).rev() {
                        unsafe { d.destroy_image_view(v, None) };
                    }
                }
                ResourceKind::Sampler => {
                    for s in self.samplers.drain(..).rev() {
                        unsafe { d.destroy_sampler(s, None) };
                    }
                }
                ResourceKind::CommandPool => {
                    for p in self.command_pools.drain(..).rev() {
                        unsafe { d.destroy_command_pool(p, None) };
                    }
                }
                ResourceKind::Semaphore => {
                    for s in self.semaphores.drain(..).rev() {
                        unsafe { d.destroy_semaphore(s, None) };
                    }
                }
                ResourceKind::Fence => {
                    for f in self.fences.drain(..).rev() {
                        unsafe { d.destroy_fence(f, None) };
                    }
                }
                ResourceKind::Buffer => {
                    let mut allocator = device.allocator().lock().unwrap();
                    for (b, allocation) in self.buffers.drain(..).rev() {
                        unsafe { d.destroy_buffer(b, None) };
                        if let Err(e) = allocator.free(allocation) {
                            tracing::error!("Failed to free buffer allocation: {:?}", e);
                        }
                    }
                }
                ResourceKind::Image => {
                    let mut allocator = device.allocator().lock().unwrap();
                    for (i, allocation) in self.images.drain(..).rev() {
                        unsafe { d.destroy_image(i, None) };
                        if let Err(e) = allocator.free(allocation) {
                            tracing::error!("Failed to free image allocation: {:?}", e);
                        }
                    }
                }
            }
        }

        debug!("Deletion queue flushed ({} handles)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn position(kind: ResourceKind) -> usize {
        DESTROY_ORDER.iter().position(|&k| k == kind).unwrap()
    }

    #[test]
    fn test_destroy_order_covers_every_kind_once() {
        for kind in DESTROY_ORDER {
            assert_eq!(
                DESTROY_ORDER.iter().filter(|&&k| k == kind).count(),
                1,
                "{:?} must appear exactly once",
                kind
            );
        }
    }

    #[test]
    fn test_dependents_destroyed_before_dependencies() {
        // Pipelines reference their layouts; layouts reference set layouts.
        assert!(position(ResourceKind::Pipeline) < position(ResourceKind::PipelineLayout));
        assert!(
            position(ResourceKind::PipelineLayout) < position(ResourceKind::DescriptorSetLayout)
        );
        // Framebuffers attach image views; views wrap images.
        assert!(position(ResourceKind::Framebuffer) < position(ResourceKind::ImageView));
        assert!(position(ResourceKind::ImageView) < position(ResourceKind::Image));
        // Views come before the buffers/images backing them.
        assert!(position(ResourceKind::ImageView) < position(ResourceKind::Buffer));
    }

    #[test]
    fn test_null_handles_are_ignored() {
        let mut queue = DeletionQueue::new();
        queue.add_image_view(vk::ImageView::null());
        queue.add_pipeline(vk::Pipeline::null());
        queue.add_semaphore(vk::Semaphore::null());
        queue.add_framebuffer(vk::Framebuffer::null());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_adds_land_in_their_buckets() {
        let mut queue = DeletionQueue::new();
        queue.reserve(4);

        // Fabricated non-null handles; never flushed in this test.
        queue.add_image_view(vk::ImageView::from_raw(0x10));
        queue.add_image_view(vk::ImageView::from_raw(0x20));
        queue.add_fence(vk::Fence::from_raw(0x30));

        assert_eq!(queue.pending(ResourceKind::ImageView), 2);
        assert_eq!(queue.pending(ResourceKind::Fence), 1);
        assert_eq!(queue.pending(ResourceKind::Buffer), 0);
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());
    }
}
