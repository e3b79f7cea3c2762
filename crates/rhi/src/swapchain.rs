//! Presentation surface (swapchain) management.
//!
//! The [`Swapchain`] owns everything tied to the presentable images: the
//! images themselves, their views, one depth target per image, the render
//! pass describing the attachments, one framebuffer and one present
//! semaphore per image, and a private [`DeletionQueue`] holding the
//! size-dependent subset of those resources.
//!
//! # Lifecycle
//!
//! Built once at startup. Whenever an acquire or present reports the
//! surface out of date, suboptimal, or lost, the swapchain flips to the
//! "stale" state; the draw loop checks [`Swapchain::is_good`] before
//! acquiring and calls [`Swapchain::recreate`] instead of proceeding.
//! Recreation waits for the device to go idle, flushes the private deletion
//! queue, and rebuilds at the new extent. The render pass is format-stable
//! and deliberately survives recreation, keeping the same handle.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info, warn};

use crate::deletion::DeletionQueue;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats probed at first build, in preference order.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Preferred number of presentable images (triple buffering), clamped to
/// what the surface supports.
const DESIRED_IMAGE_COUNT: u32 = 3;

/// Surface support details for swapchain creation.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities (image count bounds, extents, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space combinations.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries surface support for a physical device.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentation surface manager.
///
/// See the module docs for the ownership and lifecycle model. Accessors
/// hand out raw handles; the deletion queue holds ownership of every
/// size-dependent resource until the next recreate or destroy.
pub struct Swapchain {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,

    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    present_semaphores: Vec<vk::Semaphore>,

    /// Format-stable; created at first build, reused across recreates.
    render_pass: vk::RenderPass,

    /// Size-dependent resources awaiting the next flush.
    destroy_queue: DeletionQueue,

    good: bool,
}

impl Swapchain {
    /// Builds the presentation surface.
    ///
    /// Probes the depth format once (it is not re-probed on recreate),
    /// then runs the build path shared with [`Swapchain::recreate`].
    ///
    /// # Arguments
    ///
    /// * `device` - The device context bundle
    /// * `surface` - The window surface (owned by the platform layer)
    /// * `surface_loader` - Loader for surface queries
    /// * `extent` - Requested size in pixels
    /// * `vsync` - FIFO presentation when true, a non-blocking mode otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if the surface is unusable or any Vulkan object
    /// creation fails. A failed initial build is fatal to the engine.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        extent: vk::Extent2D,
        vsync: bool,
    ) -> RhiResult<Self> {
        let swapchain_loader =
            ash::khr::swapchain::Device::new(device.instance(), device.handle());

        let depth_format = pick_depth_format(device.instance(), device.physical_device())?;
        debug!("Depth format: {:?}", depth_format);

        let mut swapchain = Self {
            device,
            surface,
            surface_loader,
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            format: vk::Format::UNDEFINED,
            depth_format,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_views: Vec::new(),
            framebuffers: Vec::new(),
            present_semaphores: Vec::new(),
            render_pass: vk::RenderPass::null(),
            destroy_queue: DeletionQueue::new(),
            good: false,
        };

        swapchain.build(vsync)?;
        Ok(swapchain)
    }

    /// Rebuilds the surface at a new extent.
    ///
    /// Waits for the device to go idle, flushes the private deletion queue
    /// (views, depth targets, present semaphores, framebuffers, but not the
    /// render pass), destroys the old swapchain handle, and builds again.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails; the surface stays stale.
    pub fn recreate(&mut self, extent: vk::Extent2D, vsync: bool) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!(
            "Recreating swapchain: {}x{} -> {}x{}",
            self.extent.width, self.extent.height, extent.width, extent.height
        );

        self.clear();
        self.extent = extent;
        self.build(vsync)
    }

    /// Tears the surface down completely, render pass included.
    ///
    /// Idempotent; also invoked from `Drop` as a safety net.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting for the device fails.
    pub fn destroy(&mut self) -> RhiResult<()> {
        if self.swapchain == vk::SwapchainKHR::null()
            && self.render_pass == vk::RenderPass::null()
        {
            return Ok(());
        }

        self.device.wait_idle()?;
        self.clear();

        if self.render_pass != vk::RenderPass::null() {
            unsafe {
                self.device
                    .handle()
                    .destroy_render_pass(self.render_pass, None);
            }
            self.render_pass = vk::RenderPass::null();
        }

        info!("Swapchain destroyed");
        Ok(())
    }

    /// Acquires the next presentable image.
    ///
    /// `semaphore` is signaled when the image is ready (the frame slot's
    /// acquire semaphore). Returns `None` when the surface reported itself
    /// out of date; the surface is marked stale and the caller should
    /// recreate instead of rendering. A suboptimal acquire still returns
    /// the image but marks the surface stale for the next frame.
    ///
    /// # Errors
    ///
    /// Any result other than success/suboptimal/out-of-date is an error.
    pub fn acquire(&mut self, semaphore: vk::Semaphore) -> RhiResult<Option<u32>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Swapchain suboptimal during acquire");
                    self.good = false;
                }
                Ok(Some(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.good = false;
                Ok(None)
            }
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => {
                warn!("Surface lost during acquire");
                self.good = false;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Presents the given image, waiting on its present semaphore.
    ///
    /// Out-of-date and suboptimal results mark the surface stale and are
    /// otherwise silent; real failures propagate.
    ///
    /// # Errors
    ///
    /// Any result other than success/suboptimal/out-of-date is an error.
    pub fn present(&mut self, image_index: u32) -> RhiResult<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [self.present_semaphores[image_index as usize]];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        match result {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain suboptimal during present");
                self.good = false;
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                self.good = false;
                Ok(())
            }
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => {
                warn!("Surface lost during present");
                self.good = false;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the surface is usable; stale surfaces must be recreated
    /// before acquiring.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.good
    }

    /// Marks the surface stale (e.g. after a window resize event).
    #[inline]
    pub fn mark_stale(&mut self) {
        self.good = false;
    }

    /// Returns the current extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the color format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the depth format chosen at first build.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Returns the number of presentable images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the render pass describing the color+depth attachments.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the image view for the given image index.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Returns the framebuffer for the given image index.
    #[inline]
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    /// Returns the present semaphore for the given image index.
    ///
    /// The frame submission signals this semaphore; presentation of the
    /// same image waits on it.
    #[inline]
    pub fn present_semaphore(&self, index: usize) -> vk::Semaphore {
        self.present_semaphores[index]
    }

    /// Creates the swapchain and every size-dependent resource.
    fn build(&mut self, vsync: bool) -> RhiResult<()> {
        let support = SurfaceSupport::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate surface support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, self.extent.width, self.extent.height);
        let image_count = choose_image_count(&support.capabilities);

        info!(
            "Building swapchain: {}x{}, {:?}, {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        // Queue family sharing between graphics and present
        let families = self.device.queue_families();
        let graphics_family = families.graphics_family.unwrap();
        let present_family = families.present_family.unwrap();
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        self.format = surface_format.format;
        self.extent = extent;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain)? };
        let image_count = self.images.len();
        self.destroy_queue.reserve(image_count);

        // Color views
        self.image_views = Vec::with_capacity(image_count);
        for &image in &self.images {
            let view = create_image_view(
                &self.device,
                image,
                self.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            self.destroy_queue.add_image_view(view);
            self.image_views.push(view);
        }

        // Depth target per image
        self.depth_views = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            let (image, view, allocation) =
                create_depth_target(&self.device, extent, self.depth_format)?;
            self.destroy_queue.add_image_view(view);
            self.destroy_queue.add_image(image, allocation);
            self.depth_views.push(view);
        }

        // One present semaphore per image
        self.present_semaphores = Vec::with_capacity(image_count);
        let sem_info = vk::SemaphoreCreateInfo::default();
        for _ in 0..image_count {
            let semaphore = unsafe { self.device.handle().create_semaphore(&sem_info, None)? };
            self.destroy_queue.add_semaphore(semaphore);
            self.present_semaphores.push(semaphore);
        }

        // The render pass depends only on formats, which are stable across
        // recreates; create it once and keep it out of the deletion queue.
        if self.render_pass == vk::RenderPass::null() {
            self.render_pass =
                create_render_pass(&self.device, self.format, self.depth_format)?;
        }

        // Framebuffers
        self.framebuffers = Vec::with_capacity(image_count);
        for i in 0..image_count {
            let attachments = [self.image_views[i], self.depth_views[i]];
            let fb_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { self.device.handle().create_framebuffer(&fb_info, None)? };
            self.destroy_queue.add_framebuffer(framebuffer);
            self.framebuffers.push(framebuffer);
        }

        self.good = true;
        Ok(())
    }

    /// Flushes the size-dependent resources and destroys the swapchain
    /// handle. Caller must have idled the device.
    fn clear(&mut self) {
        self.destroy_queue.flush(&self.device);

        self.image_views.clear();
        self.depth_views.clear();
        self.framebuffers.clear();
        self.present_semaphores.clear();
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
        }

        self.good = false;
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::error!("Swapchain teardown failed: {:?}", e);
        }
    }
}

/// Chooses the surface format, preferring B8G8R8A8_SRGB with the
/// SRGB_NONLINEAR color space, then any SRGB-colorspace format, then the
/// first available.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(&format) = preferred {
        return format;
    }

    let alternative = formats
        .iter()
        .find(|f| f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR);
    if let Some(&format) = alternative {
        warn!("Using fallback surface format: {:?}", format.format);
        return format;
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// Chooses the present mode.
///
/// Vsync requests FIFO, which Vulkan guarantees. Otherwise the lowest
/// latency non-blocking mode available wins: MAILBOX, then IMMEDIATE, with
/// FIFO as the last resort.
fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        return vk::PresentModeKHR::MAILBOX;
    }
    if modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
        return vk::PresentModeKHR::IMMEDIATE;
    }
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent: the surface's current extent when fixed,
/// otherwise the requested size clamped to the surface's limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Chooses the image count: triple buffering when the surface allows it.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = DESIRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Probes the supported depth format, in fixed preference order.
///
/// Chosen once at first build; never re-probed on recreate.
fn pick_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    for format in DEPTH_FORMAT_CANDIDATES {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        if props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return Ok(format);
        }
    }
    Err(RhiError::SwapchainError(
        "No supported depth format".to_string(),
    ))
}

/// Whether a depth format carries a stencil aspect.
fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    )
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

/// Creates one GPU-local depth image with its view and allocation.
fn create_depth_target(
    device: &Device,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<(vk::Image, vk::ImageView, Allocation)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.handle().create_image(&image_info, None)? };

    let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
    let allocation = {
        let mut allocator = device.allocator().lock().unwrap();
        allocator.allocate(&AllocationCreateDesc {
            name: "depth_target",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?
    };

    unsafe {
        device
            .handle()
            .bind_image_memory(image, allocation.memory(), allocation.offset())?;
    }

    let mut aspect = vk::ImageAspectFlags::DEPTH;
    if has_stencil(format) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }

    let view = create_image_view(device, image, format, aspect)?;
    Ok((image, view, allocation))
}

/// Creates the color+depth render pass.
///
/// Depends only on the color and depth formats, both stable for the life
/// of the surface.
fn create_render_pass(
    device: &Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> RhiResult<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpass = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref)];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependency = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .dst_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpass)
        .dependencies(&dependency);

    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_fallback_to_first() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_vsync_always_selects_fifo() {
        let modes = vec![
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_no_vsync_prefers_mailbox_then_immediate() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::MAILBOX
        );

        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, false),
            vk::PresentModeKHR::IMMEDIATE
        );

        let modes = vec![vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current_when_fixed() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
    }

    #[test]
    fn test_choose_image_count_prefers_triple_buffering() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);

        // Clamped by a lower maximum
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 2);

        // Raised by a higher minimum
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 4);
    }

    #[test]
    fn test_depth_candidates_order() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[1], vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(DEPTH_FORMAT_CANDIDATES[2], vk::Format::D16_UNORM);
    }

    #[test]
    fn test_stencil_aspect_detection() {
        assert!(has_stencil(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil(vk::Format::D32_SFLOAT));
        assert!(!has_stencil(vk::Format::D16_UNORM));
    }

    #[test]
    fn test_surface_support_adequacy() {
        let adequate = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!no_formats.is_adequate());
    }
}
