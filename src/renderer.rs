// =============================================================================
// RENDERER - owns every Vulkan object and drives the frame loop
// =============================================================================
//
// INIT ORDER (mandated by Vulkan):
// instance -> surface -> physical device -> logical device -> swapchain
//   -> image views -> render pass -> pipeline -> framebuffers
//   -> command pool/buffers -> vertex buffer -> sync objects
//
// Shaders are compiled before any of that, so a broken shader file fails
// startup without touching the GPU.
//
// FRAME:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait_fence ─> acquire ─> reset_fence ─> record ─> submit ─> present │
// └──────────────────────────────────────────────────────────────────────┘

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;

use crate::backend::shader::{BUILTIN_FRAGMENT, BUILTIN_VERTEX};
use crate::backend::{
    Acquired, CommandPool, DrawParams, FrameSync, Framebuffers, GraphicsPipeline, PresentSemaphores,
    RenderPass, ShaderCompiler, ShaderSource, ShaderStage, Swapchain, VertexBuffer, VulkanDevice,
};
use crate::config::Config;
use crate::vertex::{PushConstants, TRIANGLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// Nothing was submitted (minimized, or the swapchain had to be rebuilt)
    Skipped,
}

/// What the next frame has to do before it can draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePlan {
    Skip,
    Recreate,
    Render,
}

/// Window size as the swapchain should see it
#[derive(Debug, Clone, Copy)]
struct SurfaceState {
    size: (u32, u32),
    stale: bool,
}

impl SurfaceState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            stale: false,
        }
    }

    fn is_minimized(&self) -> bool {
        self.size.0 == 0 || self.size.1 == 0
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.stale = true;
    }

    /// Suboptimal or out-of-date swapchain
    fn mark_stale(&mut self) {
        self.stale = true;
    }

    fn recreated(&mut self) {
        self.stale = false;
    }

    fn plan(&self) -> FramePlan {
        if self.is_minimized() {
            FramePlan::Skip
        } else if self.stale {
            FramePlan::Recreate
        } else {
            FramePlan::Render
        }
    }
}

/// Both shader sources with their last good SPIR-V
struct ShaderSet {
    vertex_source: ShaderSource,
    fragment_source: ShaderSource,
    vertex_spirv: Vec<u32>,
    fragment_spirv: Vec<u32>,
}

impl ShaderSet {
    fn load(
        compiler: &ShaderCompiler,
        vertex_source: ShaderSource,
        fragment_source: ShaderSource,
    ) -> Result<Self> {
        let vertex_spirv = compiler.load(&vertex_source, ShaderStage::Vertex)?;
        let fragment_spirv = compiler.load(&fragment_source, ShaderStage::Fragment)?;
        Ok(Self {
            vertex_source,
            fragment_source,
            vertex_spirv,
            fragment_spirv,
        })
    }

    fn from_config(compiler: &ShaderCompiler, config: &Config) -> Result<Self> {
        let vertex_source = ShaderSource::or_builtin(config.shaders.vertex.as_deref(), BUILTIN_VERTEX);
        let fragment_source =
            ShaderSource::or_builtin(config.shaders.fragment.as_deref(), BUILTIN_FRAGMENT);
        log::info!("Shaders: vertex {}, fragment {}", vertex_source, fragment_source);

        Self::load(compiler, vertex_source, fragment_source)
    }

    /// Recompile from the same sources
    fn reload(&self, compiler: &ShaderCompiler) -> Result<Self> {
        Self::load(compiler, self.vertex_source.clone(), self.fragment_source.clone())
    }
}

/// Fields drop top to bottom: everything created from the device goes
/// before the last `Arc<VulkanDevice>`.
pub struct Renderer {
    // ─────────────────────────────────────────────────────────────────────────
    // PER-FRAME STATE
    // ─────────────────────────────────────────────────────────────────────────
    frame_sync: Vec<FrameSync>,
    present_semaphores: PresentSemaphores,
    command_buffers: Vec<vk::CommandBuffer>,
    current_frame: usize,

    // ─────────────────────────────────────────────────────────────────────────
    // GPU RESOURCES (each wrapper holds an Arc to the device)
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: CommandPool,
    vertex_buffer: VertexBuffer,
    pipeline: GraphicsPipeline,
    framebuffers: Framebuffers,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,

    // ─────────────────────────────────────────────────────────────────────────
    // SHADERS (last good SPIR-V is kept for render pass rebuilds)
    // ─────────────────────────────────────────────────────────────────────────
    compiler: ShaderCompiler,
    shaders: ShaderSet,

    // ─────────────────────────────────────────────────────────────────────────
    // SETTINGS & FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,
    surface: SurfaceState,
    start_time: Instant,
}

impl Renderer {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        // STEP 0: shaders, before any Vulkan object exists
        let compiler = ShaderCompiler::new()?;
        let shaders = ShaderSet::from_config(&compiler, config)?;

        log::info!("Initializing Vulkan...");

        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        // STEP 1: instance, surface, GPU, queues, allocator
        let device = VulkanDevice::new(
            &config.window.title,
            config.debug.validation_layers,
            display,
            window_handle,
        )?;

        // From here every object is owned by a wrapper, so an early `?`
        // destroys what was built so far before the device goes.

        // STEP 2: swapchain + image views
        let size = window.inner_size();
        let present_mode = config.present_mode();
        let swapchain = Swapchain::new(device.clone(), size.width, size.height, present_mode, None)?;

        // STEP 3: render pass + pipeline
        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &render_pass,
            &shaders.vertex_spirv,
            &shaders.fragment_spirv,
        )?;

        // STEP 4: one framebuffer per swapchain image
        let framebuffers = Framebuffers::new(
            device.clone(),
            &swapchain.image_views,
            &render_pass,
            swapchain.extent,
        )?;

        // STEP 5: commands, one buffer per frame in flight
        let frames_in_flight = config.frames_in_flight();
        let command_pool = CommandPool::new(device.clone(), device.queue_families.graphics)?;
        let command_buffers = command_pool.allocate(frames_in_flight as u32)?;

        // STEP 6: geometry
        let vertex_buffer = VertexBuffer::new(device.clone(), &command_pool, &TRIANGLE)?;

        // STEP 7: sync objects; per-slot ones survive swapchain recreation
        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>>>()?;
        let present_semaphores = PresentSemaphores::new(device.clone(), swapchain.images.len())?;

        log::info!(
            "Vulkan initialized successfully! ({} frames in flight, {} swapchain images)",
            frames_in_flight,
            swapchain.images.len()
        );

        Ok(Self {
            frame_sync,
            present_semaphores,
            command_buffers,
            current_frame: 0,
            command_pool,
            vertex_buffer,
            pipeline,
            framebuffers,
            render_pass,
            swapchain,
            device,
            compiler,
            shaders,
            clear_color: config.graphics.clear_color,
            present_mode,
            surface: SurfaceState::new(size.width, size.height),
            start_time: Instant::now(),
        })
    }

    /// Shader files on disk (embedded shaders have none)
    pub fn shader_paths(&self) -> Vec<&Path> {
        [&self.shaders.vertex_source, &self.shaders.fragment_source]
            .into_iter()
            .filter_map(ShaderSource::path)
            .collect()
    }

    pub fn is_minimized(&self) -> bool {
        self.surface.is_minimized()
    }

    /// Record a new window size; the swapchain is rebuilt on the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        match self.surface.plan() {
            FramePlan::Skip => return Ok(FrameOutcome::Skipped),
            FramePlan::Recreate => self.recreate_swapchain()?,
            FramePlan::Render => {}
        }

        let slot = self.current_frame;
        let image_available = self.frame_sync[slot].image_available;
        let in_flight_fence = self.frame_sync[slot].in_flight_fence;

        // STEP 1: wait until the GPU is done with this slot's command buffer
        self.frame_sync[slot].wait()?;

        // STEP 2: acquire next swapchain image
        let image_index = match self.swapchain.acquire_next_image(image_available)? {
            Acquired::Image { index, suboptimal } => {
                if suboptimal {
                    self.surface.mark_stale();
                }
                index
            }
            Acquired::OutOfDate => {
                // The fence is still signaled, so the slot can be retried
                self.surface.mark_stale();
                self.recreate_swapchain()?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        // STEP 3: reset only now that work will definitely be submitted
        self.frame_sync[slot].reset()?;

        // STEP 4: record
        let cmd = self.command_buffers[slot];
        let extent = self.swapchain.extent;
        let framebuffer = self
            .framebuffers
            .get(image_index)
            .context("Swapchain returned an image index without a framebuffer")?;
        let render_finished = self
            .present_semaphores
            .for_image(image_index)
            .context("Swapchain returned an image index without a semaphore")?;

        self.command_pool.record_triangle(
            cmd,
            &DrawParams {
                render_pass: self.render_pass.render_pass,
                framebuffer,
                extent,
                pipeline: &self.pipeline,
                vertex_buffer: self.vertex_buffer.buffer.buffer,
                vertex_count: self.vertex_buffer.vertex_count,
                clear_color: self.clear_color,
                push_constants: PushConstants::new(
                    self.start_time.elapsed().as_secs_f32(),
                    extent.width,
                    extent.height,
                ),
            },
        )?;

        // STEP 5: submit
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    &[submit_info.build()],
                    in_flight_fence,
                )
                .context("Failed to submit draw command buffer")?;
        }

        // STEP 6: present
        let stale = self.swapchain.present(
            self.device.present_queue,
            image_index,
            &signal_semaphores,
        )?;
        if stale {
            self.surface.mark_stale();
        }

        // STEP 7: advance to next slot
        self.current_frame = (self.current_frame + 1) % self.frame_sync.len();

        Ok(FrameOutcome::Rendered)
    }

    // =========================================================================
    // RECREATION
    // =========================================================================

    /// Rebuild the swapchain and everything sized or formatted by it.
    ///
    /// New objects are all built before any old one is replaced; a failure
    /// part way leaves the current set intact.
    fn recreate_swapchain(&mut self) -> Result<()> {
        if self.surface.is_minimized() {
            return Ok(());
        }

        // Nothing may still be using the old images
        self.device.wait_idle()?;

        let (width, height) = self.surface.size;
        let swapchain = Swapchain::new(
            self.device.clone(),
            width,
            height,
            self.present_mode,
            Some(&self.swapchain),
        )?;

        // Render pass (and the pipeline built against it) depend on the format
        let rebuilt = if swapchain.format != self.swapchain.format {
            log::info!(
                "Surface format changed {:?} -> {:?}, rebuilding pipeline",
                self.swapchain.format,
                swapchain.format
            );
            let render_pass = RenderPass::new(self.device.clone(), swapchain.format)?;
            let pipeline = GraphicsPipeline::new(
                self.device.clone(),
                &render_pass,
                &self.shaders.vertex_spirv,
                &self.shaders.fragment_spirv,
            )?;
            Some((render_pass, pipeline))
        } else {
            None
        };

        let render_pass = rebuilt.as_ref().map_or(&self.render_pass, |(render_pass, _)| render_pass);
        let framebuffers = Framebuffers::new(
            self.device.clone(),
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;
        let present_semaphores = PresentSemaphores::new(self.device.clone(), swapchain.images.len())?;

        // Old objects drop as they are replaced: framebuffers before the
        // render pass they were made for, the old swapchain last.
        self.framebuffers = framebuffers;
        if let Some((render_pass, pipeline)) = rebuilt {
            self.pipeline = pipeline;
            self.render_pass = render_pass;
        }
        self.present_semaphores = present_semaphores;
        self.swapchain = swapchain;
        self.surface.recreated();

        Ok(())
    }

    /// Recompile both shaders and swap in a new pipeline.
    ///
    /// A broken shader is logged and the current pipeline keeps running.
    /// Returns whether the pipeline was replaced.
    pub fn reload_shaders(&mut self) -> Result<bool> {
        log::info!("Reloading shaders...");

        let shaders = match self.shaders.reload(&self.compiler) {
            Ok(shaders) => shaders,
            Err(e) => {
                log::error!("Shader reload failed, keeping previous pipeline: {:#}", e);
                return Ok(false);
            }
        };

        let pipeline = match GraphicsPipeline::new(
            self.device.clone(),
            &self.render_pass,
            &shaders.vertex_spirv,
            &shaders.fragment_spirv,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                log::error!("Pipeline rebuild failed, keeping previous pipeline: {:#}", e);
                return Ok(false);
            }
        };

        // The old pipeline may still be referenced by in-flight command buffers
        self.device.wait_idle()?;
        self.pipeline = pipeline;
        self.shaders = shaders;

        log::info!("Shaders reloaded");
        Ok(true)
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Wait for GPU to finish; the fields then destroy themselves in
        // declaration order, and the device goes last with its final Arc.
        if let Err(e) = self.device.wait_idle() {
            log::error!("wait_idle during cleanup failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn minimized_window_skips_frames() {
        let mut surface = SurfaceState::new(800, 600);
        assert_eq!(surface.plan(), FramePlan::Render);

        surface.resize(0, 600);
        assert!(surface.is_minimized());
        assert_eq!(surface.plan(), FramePlan::Skip);

        surface.resize(800, 0);
        assert_eq!(surface.plan(), FramePlan::Skip);
    }

    #[test]
    fn restore_after_minimize_rebuilds_once() {
        let mut surface = SurfaceState::new(800, 600);
        surface.resize(0, 0);
        surface.resize(1024, 768);
        assert_eq!(surface.plan(), FramePlan::Recreate);

        surface.recreated();
        assert_eq!(surface.plan(), FramePlan::Render);
        assert_eq!(surface.size, (1024, 768));
    }

    #[test]
    fn suboptimal_present_schedules_a_rebuild() {
        let mut surface = SurfaceState::new(800, 600);
        surface.mark_stale();
        assert_eq!(surface.plan(), FramePlan::Recreate);
    }

    #[test]
    fn builtin_shaders_load() {
        let compiler = ShaderCompiler::new().unwrap();
        let shaders = ShaderSet::from_config(&compiler, &Config::default()).unwrap();
        assert!(!shaders.vertex_spirv.is_empty());
        assert!(!shaders.fragment_spirv.is_empty());
    }

    #[test]
    fn missing_shader_file_fails_before_gpu_setup() {
        let compiler = ShaderCompiler::new().unwrap();
        let mut config = Config::default();
        config.shaders.fragment = Some(PathBuf::from("no/such/dir/missing.frag"));

        let err = ShaderSet::from_config(&compiler, &config).err().unwrap();
        assert!(format!("{:#}", err).contains("missing.frag"));
    }

    #[test]
    fn reload_keeps_sources() {
        let compiler = ShaderCompiler::new().unwrap();
        let shaders = ShaderSet::from_config(&compiler, &Config::default()).unwrap();
        let reloaded = shaders.reload(&compiler).unwrap();
        assert_eq!(reloaded.vertex_source, shaders.vertex_source);
        assert_eq!(reloaded.fragment_spirv, shaders.fragment_spirv);
    }
}
