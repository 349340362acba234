// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash: capability probing, context construction,
// swapchain, pipeline, shaders, and sync objects.

pub mod caps;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanContext;
pub use swapchain::Swapchain;
