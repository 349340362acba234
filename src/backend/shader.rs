// Shader module loading
//
// Shaders arrive as pre-compiled SPIR-V blobs on disk. The bytes are
// opaque to us; only the driver validates them at module creation.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanContext;

/// Read a SPIR-V blob from `path` and wrap it into a shader module.
pub fn load_shader_module(
    context: &VulkanContext,
    path: impl AsRef<Path>,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file {:?}", path))?;

    // SPIR-V is a stream of 4-byte words; read_spv re-aligns for us
    let code = ash::util::read_spv(&mut Cursor::new(bytes))
        .with_context(|| format!("Invalid SPIR-V in {:?}", path))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        context
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {:?}", path))
    }
}
