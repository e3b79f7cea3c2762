//! Renderer orchestration.
//!
//! Ties the resource-lifecycle pieces together: builds the presentation
//! surface, the frame ring, the upload context, and the mesh arena from
//! one device context, then drives the per-frame loop:
//!
//! ```text
//! stale check -> slot select (fence) -> acquire -> record -> submit -> present
//! ```
//!
//! Recoverable presentation conditions (out of date, suboptimal) are
//! silent: the frame is skipped or the surface rebuilt. Device-level
//! failures propagate as fatal errors for the application shell to log
//! and exit on.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use kiln_core::EngineConfig;
use kiln_platform::{Surface, Window};
use kiln_rhi::deletion::DeletionQueue;
use kiln_rhi::device::Device;
use kiln_rhi::instance::Instance;
use kiln_rhi::physical_device::select_physical_device;
use kiln_rhi::swapchain::Swapchain;
use kiln_rhi::upload::ImmediateContext;

use crate::drawable::Drawable;
use crate::error::RenderError;
use crate::frame::{FrameRing, SlotPolicy};
use crate::mesh_arena::{MeshAllocation, MeshArena, MeshData};

/// The engine's renderer.
///
/// Owns the full GPU resource stack. Shutdown (via `Drop`) flushes the
/// deletion queues in dependency order: frame-local, then the arena, then
/// the surface, then the engine-global queue.
pub struct Renderer {
    drawables: Vec<Drawable>,
    arena: MeshArena,
    upload: ImmediateContext,
    frames: FrameRing,
    swapchain: Swapchain,

    /// Pipeline + layout installed by the material/pipeline collaborator.
    /// Without one, frames render the clear pass only.
    pipeline: Option<(vk::Pipeline, vk::PipelineLayout)>,

    /// Engine-global deletion queue, flushed last at shutdown.
    destroy_queue: DeletionQueue,

    vsync: bool,
    pending_extent: Option<vk::Extent2D>,

    device: Arc<Device>,
    _surface: Surface,
    _instance: Instance,
}

impl Renderer {
    /// Builds the renderer against a window.
    ///
    /// Creation order: instance, surface, device selection, device,
    /// swapchain, frame ring, upload context, mesh arena.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal; there is nothing to render without the
    /// full stack.
    pub fn new(window: &Window, config: &EngineConfig) -> Result<Self, RenderError> {
        let instance = Instance::new(config.validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let extent = vk::Extent2D {
            width: window.width(),
            height: window.height(),
        };
        let swapchain = Swapchain::new(
            device.clone(),
            surface.handle(),
            surface.loader().clone(),
            extent,
            config.vsync,
        )?;

        let frames = FrameRing::new(
            device.clone(),
            config.frame_overlap,
            SlotPolicy::from(config.slot_policy),
        )?;
        let upload = ImmediateContext::new(device.clone())?;
        let arena = MeshArena::new(
            device.clone(),
            config.vertex_arena_bytes,
            config.index_arena_bytes,
        )?;

        info!("Renderer initialized");

        Ok(Self {
            drawables: Vec::new(),
            arena,
            upload,
            frames,
            swapchain,
            pipeline: None,
            destroy_queue: DeletionQueue::new(),
            vsync: config.vsync,
            pending_extent: None,
            device,
            _surface: surface,
            _instance: instance,
        })
    }

    /// Uploads mesh data into the shared arena and returns its allocation.
    ///
    /// # Errors
    ///
    /// Out-of-space is recoverable; the caller should stop loading.
    pub fn load_mesh(&mut self, mesh: &MeshData) -> Result<MeshAllocation, RenderError> {
        Ok(self.arena.allocate(&mut self.upload, mesh)?)
    }

    /// Uploads mesh data into the arena and registers it as a drawable.
    ///
    /// # Errors
    ///
    /// See [`Renderer::load_mesh`].
    pub fn add_arena_mesh(&mut self, mesh: &MeshData) -> Result<(), RenderError> {
        let allocation = self.load_mesh(mesh)?;
        self.drawables.push(Drawable::Arena(allocation));
        Ok(())
    }

    /// Registers a mesh as a host-resident drawable with its own buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails.
    pub fn add_resident_mesh(&mut self, mesh: &MeshData) -> Result<(), RenderError> {
        let drawable = Drawable::new_resident(self.device.clone(), mesh)?;
        self.drawables.push(drawable);
        Ok(())
    }

    /// Installs the graphics pipeline used to draw the scene.
    ///
    /// The handles come from the pipeline/material collaborator; ownership
    /// transfers here and both are retired through the engine-global
    /// deletion queue at shutdown.
    pub fn install_pipeline(&mut self, pipeline: vk::Pipeline, layout: vk::PipelineLayout) {
        self.destroy_queue.add_pipeline(pipeline);
        self.destroy_queue.add_pipeline_layout(layout);
        self.pipeline = Some((pipeline, layout));
    }

    /// Notes a window resize; the surface is rebuilt on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pending_extent = Some(vk::Extent2D { width, height });
        self.swapchain.mark_stale();
    }

    /// Renders one frame.
    ///
    /// A stale surface triggers recreation instead of rendering; GPU
    /// backpressure under the polling policy skips the frame. Both are
    /// silent to the user.
    ///
    /// # Errors
    ///
    /// Only fatal conditions escape: lost device, failed submit or
    /// present, failed surface rebuild.
    pub fn render_frame(&mut self) -> Result<(), RenderError> {
        if !self.swapchain.is_good() {
            let extent = self
                .pending_extent
                .take()
                .unwrap_or_else(|| self.swapchain.extent());

            // A minimized window has no surface to rebuild yet.
            if extent.width == 0 || extent.height == 0 {
                self.pending_extent = Some(extent);
                return Ok(());
            }

            self.frames.wait_all()?;
            self.swapchain.recreate(extent, self.vsync)?;
            return Ok(());
        }

        if !self.frames.begin_frame()? {
            return Ok(());
        }

        let acquire_semaphore = self.frames.current().acquire_semaphore().handle();
        let Some(image_index) = self.swapchain.acquire(acquire_semaphore)? else {
            // Surface went stale during acquire; rebuilt next frame.
            return Ok(());
        };

        let cmd = self.frames.current().command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        self.record_main_pass(image_index as usize);
        self.frames.current().command_buffer().end()?;

        self.frames
            .submit(self.swapchain.present_semaphore(image_index as usize))?;
        self.swapchain.present(image_index)?;

        self.frames.end_frame();
        Ok(())
    }

    /// Records the main pass into the current slot's command buffer.
    fn record_main_pass(&self, image_index: usize) {
        let cmd = self.frames.current().command_buffer();
        let extent = self.swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.05, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(image_index))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);

        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

        if let Some((pipeline, _layout)) = self.pipeline {
            cmd.bind_pipeline(pipeline);
            for drawable in &self.drawables {
                drawable.record(cmd, &self.arena);
            }
        }

        cmd.end_render_pass();
    }

    /// Tears the scene down: retires every drawable's buffers and resets
    /// the arena to empty. Registered pipeline and surface survive.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or the arena rebuild fails.
    pub fn clear_scene(&mut self) -> Result<(), RenderError> {
        self.device.wait_idle()?;

        for drawable in self.drawables.drain(..) {
            drawable.retire(&mut self.destroy_queue);
        }
        self.arena.reset()?;

        debug!("Scene cleared");
        Ok(())
    }

    /// The device context bundle.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The mesh arena.
    #[inline]
    pub fn arena(&self) -> &MeshArena {
        &self.arena
    }

    /// Number of registered drawables.
    #[inline]
    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Shutdown flush order: frame-local queues, then the arena, then
        // the surface, then the engine-global queue.
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Device wait failed during shutdown: {:?}", e);
        }

        self.frames.flush_slot_queues();

        for drawable in self.drawables.drain(..) {
            drawable.retire(&mut self.destroy_queue);
        }
        self.arena.teardown();

        if let Err(e) = self.swapchain.destroy() {
            tracing::error!("Swapchain teardown failed: {:?}", e);
        }

        self.destroy_queue.flush(&self.device);

        info!("Renderer shut down");
    }
}
