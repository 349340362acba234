// Vulkan context - instance, surface, device, queues
//
// Responsibilities:
// - Instance creation with validation layers + debug messenger
// - Presentation surface from the window handles
// - Physical device selection (first suitable wins)
// - Logical device + graphics/present queue creation

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use winit::window::Window;

use super::caps::{self, QueueFamilyIndices, SwapchainSupport};

/// Layers requested when validation is enabled.
const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

/// Device extensions every candidate GPU must support.
const DEVICE_EXTENSIONS: &[&CStr] = &[c"VK_KHR_swapchain"];

/// Vulkan context wrapper with automatic cleanup.
///
/// Owns the whole instance-to-queue chain. Everything created from the
/// device (swapchain, pipeline, pools, sync objects) must be destroyed
/// before this drops.
pub struct VulkanContext {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles (same handle if the families coincide)
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,

    // Debug utils (if validation enabled and the extension exists)
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanContext {
    /// Create the full Vulkan context for `window`.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Request validation layers + debug messenger
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan context: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Verify requested validation layers are available (fatal if not)
        if enable_validation {
            let available = entry
                .enumerate_instance_layer_properties()
                .context("Failed to enumerate instance layers")?;
            if !caps::layers_supported(&available, VALIDATION_LAYERS) {
                anyhow::bail!("Requested validation layers are not available");
            }
        }

        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        // Step 3: Create instance (debug messenger chained into creation)
        let (instance, debug_utils_available) =
            Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        // Step 4: Persistent debug messenger. The extension is optional
        // loader functionality; missing means no diagnostics, not failure.
        let debug_utils = if enable_validation && debug_utils_available {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            if enable_validation {
                log::warn!("VK_EXT_debug_utils unavailable, validation messages disabled");
            }
            None
        };

        // Step 5: Create surface (platform-specific window connection)
        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
        }
        .context("Failed to create window surface")?;

        // Step 6: Pick physical device (GPU)
        let (physical_device, queue_families) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        // Step 7: Create logical device + fetch queues
        let (device, graphics_queue, present_queue) = Self::create_logical_device(
            &instance,
            physical_device,
            &queue_families,
            enable_validation,
        )?;

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            queue_families,
            debug_utils,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: raw_window_handle::RawDisplayHandle,
    ) -> Result<(ash::Instance, bool)> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("No Engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Diagnostics: list what the loader offers
        let available_extensions = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?;
        log::info!("Available Vulkan instance extensions:");
        for ext in &available_extensions {
            log::info!(
                "\t{}",
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_string_lossy()
            );
        }

        // Required extensions: whatever the windowing system needs, plus
        // debug utils when the loader actually has it
        let mut extensions = ash_window::enumerate_required_extensions(display_handle)
            .context("Failed to query required surface extensions")?
            .to_vec();

        let debug_utils_name = ash::extensions::ext::DebugUtils::name();
        let debug_utils_available =
            caps::extensions_supported(&available_extensions, &[debug_utils_name]);
        if debug_utils_available {
            extensions.push(debug_utils_name.as_ptr());
        }

        let layer_names: Vec<*const std::os::raw::c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let mut debug_create_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        // Chain the messenger descriptor so problems inside
        // vkCreateInstance itself are reported too
        if enable_validation && debug_utils_available {
            create_info = create_info.push_next(&mut debug_create_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok((instance, debug_utils_available))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = debug_messenger_create_info();
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    /// Enumerate GPUs and take the first one that satisfies the
    /// suitability predicate. No scoring; a device either works or it
    /// gets skipped.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        for device in devices {
            let indices = QueueFamilyIndices::find(instance, device, surface_loader, surface)?;

            let available = unsafe { instance.enumerate_device_extension_properties(device) }?;
            let extensions_ok = caps::extensions_supported(&available, DEVICE_EXTENSIONS);

            let support = SwapchainSupport::query(device, surface_loader, surface)?;

            if caps::is_device_suitable(&indices, extensions_ok, &support) {
                return Ok((device, indices));
            }
        }

        anyhow::bail!("No GPU satisfies the renderer's requirements")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
        enable_validation: bool,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let graphics_family = queue_families
            .graphics
            .context("Graphics queue family missing after device selection")?;
        let present_family = queue_families
            .present
            .context("Present queue family missing after device selection")?;

        // One queue-create-info per unique family; graphics and present
        // often share a family and the driver rejects duplicates
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const std::os::raw::c_char> =
            DEVICE_EXTENSIONS.iter().map(|name| name.as_ptr()).collect();

        // Device-level layers are ignored by modern drivers but older
        // ones still read them, so mirror the instance list
        let layer_names: Vec<*const std::os::raw::c_char> = if enable_validation {
            VALIDATION_LAYERS.iter().map(|name| name.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok((device, graphics_queue, present_queue))
    }

    /// Wait for the device to go idle (e.g. before cleanup).
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan context...");

        let _ = self.wait_idle();

        // Cleanup in reverse order of creation
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers; diagnostic only, never fatal
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
