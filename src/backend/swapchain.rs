// Swapchain - window presentation
//
// The rotating set of images we render into and hand to the display.
// Created once for the process lifetime; the window is not resizable so
// there is no recreation path.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::caps::SwapchainSupport;
use super::VulkanContext;

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    context: Arc<VulkanContext>,
}

impl Swapchain {
    /// Create the swapchain plus one image view per image.
    ///
    /// `fb_width`/`fb_height` are the framebuffer pixel size, only
    /// consulted when the surface reports the "application decides"
    /// sentinel extent.
    pub fn new(context: Arc<VulkanContext>, fb_width: u32, fb_height: u32) -> Result<Self> {
        let support = SwapchainSupport::query(
            context.physical_device,
            &context.surface_loader,
            context.surface,
        )?;

        let surface_format = support.choose_format();
        let present_mode = support.choose_present_mode();
        let extent = support.choose_extent(fb_width, fb_height);
        let image_count = support.choose_image_count();

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            image_count,
            present_mode
        );

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&context.instance, &context.device);

        // Concurrent sharing only when graphics and present live in
        // different families; exclusive is faster otherwise
        let family_indices = context.queue_families.unique();
        let (sharing_mode, family_slice): (vk::SharingMode, &[u32]) = if family_indices.len() > 1 {
            (vk::SharingMode::CONCURRENT, &family_indices)
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
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
        // No old_swapchain handle: recreation is unsupported by design

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // The driver may hand back more images than requested
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        log::info!("Swapchain returned {} images", images.len());

        let image_views: Result<Vec<_>> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    context
                        .device
                        .create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect();

        Ok(Self {
            swapchain,
            swapchain_loader,
            image_views: image_views?,
            format: surface_format.format,
            extent,
            context,
        })
    }

    /// Acquire the next image, signaling `semaphore` once it is usable.
    /// Any driver error is fatal here; there is no out-of-date recovery.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, _suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
        .context("Failed to acquire swapchain image")?;

        Ok(index)
    }

    /// Present `image_index` on `queue` after `wait_semaphores` fire.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .context("Failed to present swapchain image")?;

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.context.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
