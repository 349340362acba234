// =============================================================================
// VULKAN HELLO TRIANGLE
// =============================================================================
//
// Brings up a Vulkan context and draws one hard-coded triangle, forever.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input, close request)                │
// │    └── VulkanContext (instance, surface, device, queues)        │
// │          └── Swapchain + render pass + pipeline + framebuffers  │
// │                └── Command buffer (re-recorded per frame)       │
// │                      └── Synchronization (fence, semaphores)    │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (exactly one frame in flight):
// 1. Wait on the in-flight fence, then reset it
// 2. Acquire the next swapchain image
// 3. Reset + re-record the command buffer for that image
// 4. Submit (waits image-available, signals render-finished + fence)
// 5. Present (waits render-finished)
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::{Swapchain, VulkanContext};
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan hello triangle");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Errors inside winit callbacks are stashed on the App; this is the
    // single exit funnel that turns them into a failing exit status
    match app.fatal_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// IMPORTANT: resources must be destroyed in reverse order of creation to
/// avoid use-after-free; Drop below is that explicit reverse list.
pub struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW & VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    context: Option<Arc<VulkanContext>>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // RENDERING
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS & SYNCHRONIZATION
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: vk::CommandPool,
    /// The single reusable primary buffer, re-recorded every frame
    command_buffer: vk::CommandBuffer,
    frame_sync: Option<backend::sync::FrameSync>,

    // ─────────────────────────────────────────────────────────────────────────
    // ERROR FUNNEL
    // ─────────────────────────────────────────────────────────────────────────
    /// First fatal error raised inside a winit callback; re-raised by main
    fatal_error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            context: None,
            swapchain: None,
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            frame_sync: None,
            fatal_error: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Initialize every Vulkan resource, in strict dependency order:
    /// context → swapchain → render pass → pipeline → framebuffers →
    /// command pool/buffer → sync objects.
    ///
    /// Each resource lands on `self` as soon as it exists, so Drop can
    /// release whatever was created even when a later step fails.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation =
            cfg!(debug_assertions) && self.config.debug.validation_layers;

        let context =
            VulkanContext::new(&window, &self.config.window.title, enable_validation)?;
        self.context = Some(context.clone());

        let size = window.inner_size();
        self.swapchain = Some(Swapchain::new(context.clone(), size.width, size.height)?);
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;

        self.render_pass = backend::pipeline::create_render_pass(&context, swapchain.format)?;
        let (pipeline, pipeline_layout) =
            backend::pipeline::create_graphics_pipeline(&context, self.render_pass)?;
        self.pipeline = pipeline;
        self.pipeline_layout = pipeline_layout;

        self.framebuffers = backend::pipeline::create_framebuffers(
            &context,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;

        // One pool, one primary buffer; RESET so it can be re-recorded
        let graphics_family = context
            .queue_families
            .graphics
            .context("Graphics queue family missing after device selection")?;
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        self.command_pool = unsafe { context.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        self.command_buffer = unsafe { context.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffer")?[0];

        self.frame_sync = Some(backend::sync::FrameSync::new(&context)?);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Record the draw for `image_index` into the (already reset) command
    /// buffer: clear to opaque black, bind the pipeline, set the dynamic
    /// viewport/scissor, draw 3 vertices.
    fn record_command_buffer(&self, image_index: u32) -> Result<()> {
        let context = self.context.as_ref().context("Device not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let device = &context.device;
        let cmd = self.command_buffer;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(self.framebuffers[image_index as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: swapchain.extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);

            // Viewport/scissor are dynamic pipeline state
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: swapchain.extent.width as f32,
                height: swapchain.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            };
            device.cmd_set_scissor(cmd, 0, &[scissor]);

            // The triangle: 3 vertices, 1 instance, no buffers anywhere
            device.cmd_draw(cmd, 3, 1, 0, 0);

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .context("Failed to record command buffer")?;
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame.
    ///
    /// With exactly one frame in flight the fence wait at the top is what
    /// makes reusing the command buffer safe: nothing the GPU still reads
    /// is touched until the previous frame has fully retired.
    pub fn render_frame(&self) -> Result<()> {
        let context = self.context.as_ref().context("Device not initialized")?;
        let sync = self.frame_sync.as_ref().context("Sync objects not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1+2: Wait for the previous frame, reset the fence
        // ─────────────────────────────────────────────────────────────────────
        unsafe {
            context
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)
                .context("Failed waiting for in-flight fence")?;
            context
                .device
                .reset_fences(&[sync.in_flight_fence])
                .context("Failed to reset in-flight fence")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Acquire the next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let image_index = swapchain.acquire_next_image(u64::MAX, sync.image_available)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Reset and re-record the command buffer
        // ─────────────────────────────────────────────────────────────────────
        unsafe {
            context
                .device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
        }
        self.record_command_buffer(image_index)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Submit to the graphics queue
        // ─────────────────────────────────────────────────────────────────────
        let wait_semaphores = [sync.image_available];
        // Earlier stages may run before the image is ready; only color
        // writes have to wait for it
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            context
                .device
                .queue_submit(
                    context.graphics_queue,
                    &[submit_info.build()],
                    sync.in_flight_fence,
                )
                .context("Failed to submit draw command buffer")?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Present the image
        // ─────────────────────────────────────────────────────────────────────
        swapchain.present(context.present_queue, image_index, &signal_semaphores)?;

        Ok(())
    }

    /// Stash the first fatal error and stop the loop; teardown happens in
    /// Drop, the exit status in main.
    fn abort_with(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal error: {:?}", error);
        if self.fatal_error.is_none() {
            self.fatal_error = Some(error);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed-size window: resizing would invalidate the swapchain and
        // recreation is deliberately unsupported
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.abort_with(event_loop, anyhow::anyhow!(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_vulkan(window.clone()) {
            self.abort_with(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                // Let outstanding GPU work retire before teardown starts
                if let Some(ref context) = self.context {
                    let _ = context.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if self.context.is_none() || self.fatal_error.is_some() {
                    return;
                }
                if let Err(e) = self.render_frame() {
                    self.abort_with(event_loop, e);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{Key, NamedKey};

                if event.state.is_pressed() && event.logical_key == Key::Named(NamedKey::Escape) {
                    log::info!("ESC pressed, exiting...");
                    if let Some(ref context) = self.context {
                        let _ = context.wait_idle();
                    }
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Requesting a redraw here keeps the frame loop spinning.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        log::info!("Cleaning up Vulkan resources...");

        // Nothing may be destroyed while the GPU still references it
        let _ = context.wait_idle();

        unsafe {
            // Destroy in reverse order of creation!

            // 1. Sync objects
            if let Some(sync) = self.frame_sync.take() {
                sync.destroy(&context.device);
            }

            // 2. Command pool (also frees the command buffer)
            if self.command_pool != vk::CommandPool::null() {
                context.device.destroy_command_pool(self.command_pool, None);
            }

            // 3. Framebuffers
            for &framebuffer in &self.framebuffers {
                context.device.destroy_framebuffer(framebuffer, None);
            }

            // 4. Pipeline, layout, render pass
            if self.pipeline != vk::Pipeline::null() {
                context.device.destroy_pipeline(self.pipeline, None);
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                context.device.destroy_pipeline_layout(self.pipeline_layout, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                context.device.destroy_render_pass(self.render_pass, None);
            }
        }

        // 5. Swapchain (image views + handle) via its own Drop
        self.swapchain = None;

        // 6. Context (device, surface, debug messenger, instance) drops
        // here, once the last Arc is released
        drop(context);

        log::info!("Cleanup complete");
    }
}
