// Synchronization primitives
//
// The one sync triple the single-frame-in-flight design needs: two
// semaphores for the GPU-side acquire/render/present handoffs, one fence
// so the CPU knows when the frame has fully retired.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use super::VulkanContext;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(context: &Arc<VulkanContext>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Pre-signaled so the very first frame's wait falls straight through
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            Ok(Self {
                image_available: context.device.create_semaphore(&semaphore_info, None)?,
                render_finished: context.device.create_semaphore(&semaphore_info, None)?,
                in_flight_fence: context.device.create_fence(&fence_info, None)?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
