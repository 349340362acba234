// Capability probing - what the driver/GPU can actually do
//
// Queue family lookup, layer/extension membership checks, and the
// swapchain selection policies. Everything that can be pure is pure so
// the policies stay testable without a live device.

use anyhow::Result;
use ash::vk;
use std::ffi::CStr;

/// Queue family indices required by the renderer.
///
/// A device is only usable once both are found ("complete"). On many GPUs
/// the same family ends up serving both roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan the device's queue families for graphics and present support.
    pub fn find(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let families = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        };

        let mut indices = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics.get_or_insert(i);
            }

            let present_support = unsafe {
                surface_loader.get_physical_device_surface_support(physical_device, i, surface)?
            };
            if present_support {
                indices.present.get_or_insert(i);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Deduplicated family indices, for one queue-create-info each.
    pub fn unique(&self) -> Vec<u32> {
        let mut families: Vec<u32> = self
            .graphics
            .iter()
            .chain(self.present.iter())
            .copied()
            .collect();
        families.sort_unstable();
        families.dedup();
        families
    }
}

/// Everything the surface/device pair reports about swapchain creation.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    /// A swapchain can be created at all.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Prefer BGRA8 sRGB; otherwise take whatever the driver lists first.
    pub fn choose_format(&self) -> vk::SurfaceFormatKHR {
        self.formats
            .iter()
            .copied()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .unwrap_or(self.formats[0])
    }

    /// Prefer MAILBOX (non-blocking triple buffering); FIFO is the
    /// always-available fallback.
    pub fn choose_present_mode(&self) -> vk::PresentModeKHR {
        self.present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// The surface normally dictates the extent. A current extent of
    /// u32::MAX in both dimensions means the window manager lets us pick,
    /// in which case the framebuffer pixel size is clamped into the
    /// reported bounds.
    pub fn choose_extent(&self, fb_width: u32, fb_height: u32) -> vk::Extent2D {
        let caps = &self.capabilities;
        if caps.current_extent.width != u32::MAX && caps.current_extent.height != u32::MAX {
            return caps.current_extent;
        }

        vk::Extent2D {
            width: fb_width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: fb_height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    /// One more than the minimum so we never stall on the driver, clamped
    /// by the maximum when one exists (0 means unbounded).
    pub fn choose_image_count(&self) -> u32 {
        let caps = &self.capabilities;
        let mut count = caps.min_image_count + 1;
        if caps.max_image_count != 0 {
            count = count.min(caps.max_image_count);
        }
        count
    }
}

/// Whether every `required` layer appears in the enumerated set.
pub fn layers_supported(available: &[vk::LayerProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&name| {
        available
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == name)
    })
}

/// Whether every `required` extension appears in the enumerated set.
pub fn extensions_supported(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&name| {
        available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
    })
}

/// The device suitability predicate: complete queue families, required
/// device extensions present, and at least one format + present mode.
pub fn is_device_suitable(
    indices: &QueueFamilyIndices,
    extensions_ok: bool,
    support: &SwapchainSupport,
) -> bool {
    indices.is_complete() && extensions_ok && support.is_adequate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_char;

    fn layer_props(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (i, &byte) in name.to_bytes_with_nul().iter().enumerate() {
            props.layer_name[i] = byte as c_char;
        }
        props
    }

    fn ext_props(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (i, &byte) in name.to_bytes_with_nul().iter().enumerate() {
            props.extension_name[i] = byte as c_char;
        }
        props
    }

    fn support_with(
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
    ) -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats,
            present_modes,
        }
    }

    fn adequate_support() -> SwapchainSupport {
        support_with(
            vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            vec![vk::PresentModeKHR::FIFO],
        )
    }

    #[test]
    fn queue_family_completeness() {
        let mut indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());

        indices.graphics = Some(0);
        assert!(!indices.is_complete());

        indices.present = Some(1);
        assert!(indices.is_complete());
    }

    #[test]
    fn unique_families_deduplicate_shared_index() {
        let shared = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        assert_eq!(shared.unique(), vec![0]);

        let split = QueueFamilyIndices {
            graphics: Some(1),
            present: Some(0),
        };
        assert_eq!(split.unique(), vec![0, 1]);
    }

    #[test]
    fn layer_check_requires_every_requested_layer() {
        let available = vec![
            layer_props(c"VK_LAYER_KHRONOS_validation"),
            layer_props(c"VK_LAYER_MESA_overlay"),
        ];

        assert!(layers_supported(&available, &[c"VK_LAYER_KHRONOS_validation"]));
        assert!(!layers_supported(&available, &[c"VK_LAYER_KHRONOS_synchronization2"]));
        assert!(layers_supported(&available, &[]));
    }

    #[test]
    fn extension_check_requires_full_subset() {
        let available = vec![ext_props(c"VK_KHR_swapchain"), ext_props(c"VK_EXT_debug_utils")];

        assert!(extensions_supported(&available, &[c"VK_KHR_swapchain"]));
        assert!(extensions_supported(
            &available,
            &[c"VK_KHR_swapchain", c"VK_EXT_debug_utils"],
        ));
        assert!(!extensions_supported(
            &available,
            &[c"VK_KHR_swapchain", c"VK_KHR_ray_tracing_pipeline"],
        ));
    }

    #[test]
    fn suitability_needs_all_three_conditions() {
        let complete = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(0),
        };
        let incomplete = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        let adequate = adequate_support();
        let no_formats = support_with(vec![], vec![vk::PresentModeKHR::FIFO]);
        let no_modes = support_with(adequate.formats.clone(), vec![]);

        assert!(is_device_suitable(&complete, true, &adequate));
        assert!(!is_device_suitable(&incomplete, true, &adequate));
        assert!(!is_device_suitable(&complete, false, &adequate));
        assert!(!is_device_suitable(&complete, true, &no_formats));
        assert!(!is_device_suitable(&complete, true, &no_modes));
    }

    #[test]
    fn format_selection_prefers_bgra8_srgb() {
        let support = support_with(
            vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            vec![vk::PresentModeKHR::FIFO],
        );

        let chosen = support.choose_format();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_selection_falls_back_to_first_entry() {
        // Device only exposes a single non-preferred format.
        let support = support_with(
            vec![vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            vec![vk::PresentModeKHR::FIFO],
        );

        assert_eq!(support.choose_format().format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let support = support_with(
            adequate_support().formats,
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        );
        assert_eq!(support.choose_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let support = support_with(adequate_support().formats, vec![vk::PresentModeKHR::FIFO]);
        assert_eq!(support.choose_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_surface_value_when_fixed() {
        let mut support = adequate_support();
        support.capabilities.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        // Framebuffer size is ignored when the surface dictates the extent.
        let extent = support.choose_extent(1024, 768);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_derives_from_framebuffer_on_sentinel() {
        let mut support = adequate_support();
        support.capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        support.capabilities.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        support.capabilities.max_image_extent = vk::Extent2D {
            width: 4096,
            height: 4096,
        };

        let extent = support.choose_extent(1024, 768);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn extent_clamps_componentwise_into_bounds() {
        let mut support = adequate_support();
        support.capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        support.capabilities.min_image_extent = vk::Extent2D {
            width: 200,
            height: 200,
        };
        support.capabilities.max_image_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let extent = support.choose_extent(8000, 100);
        assert_eq!((extent.width, extent.height), (1920, 200));
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        let mut support = adequate_support();
        support.capabilities.min_image_count = 2;
        support.capabilities.max_image_count = 0; // 0 = no maximum

        assert_eq!(support.choose_image_count(), 3);
    }

    #[test]
    fn image_count_clamps_to_maximum() {
        let mut support = adequate_support();
        support.capabilities.min_image_count = 2;
        support.capabilities.max_image_count = 2;

        assert_eq!(support.choose_image_count(), 2);
    }
}
