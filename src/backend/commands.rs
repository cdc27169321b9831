// Command pool and per-frame command recording
//
// Push constants change every frame, so each frame-in-flight slot owns one
// command buffer that is reset and re-recorded right before submission.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::pipeline::{GraphicsPipeline, PUSH_CONSTANT_STAGES};
use super::VulkanDevice;
use crate::vertex::PushConstants;

pub struct CommandPool {
    pub pool: vk::CommandPool,
    device: Arc<VulkanDevice>,
}

/// Everything one frame's draw needs
pub struct DrawParams<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: &'a GraphicsPipeline,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
    pub push_constants: PushConstants,
}

impl CommandPool {
    pub fn new(device: Arc<VulkanDevice>, queue_family: u32) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            // RESET: buffers are re-recorded individually every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;

        Ok(Self { pool, device })
    }

    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")
    }

    /// Record one-off work, submit it and block until the queue is idle.
    pub fn submit_once(
        &self,
        queue: vk::Queue,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        let cmd = *self
            .allocate(1)?
            .first()
            .context("Driver returned no command buffer")?;

        let result = self.run_once(queue, cmd, record);

        unsafe { self.device.device.free_command_buffers(self.pool, &[cmd]) };
        result
    }

    fn run_once(
        &self,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        let device = &self.device.device;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device.begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin one-time command buffer")?;
            record(cmd);
            device.end_command_buffer(cmd)
                .context("Failed to end one-time command buffer")?;

            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            device.queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit one-time command buffer")?;
            device.queue_wait_idle(queue)
                .context("Failed waiting for one-time command buffer")?;
        }

        Ok(())
    }

    /// Record a full frame: clear, draw the triangle, transition to present.
    ///
    /// The buffer must not be pending on the GPU (its slot's fence has been waited on).
    pub fn record_triangle(&self, cmd: vk::CommandBuffer, params: &DrawParams<'_>) -> Result<()> {
        let device = &self.device.device;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: params.clear_color,
            },
        }];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: params.extent,
        };

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: params.extent.width as f32,
            height: params.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(params.render_pass)
                .framebuffer(params.framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, params.pipeline.pipeline);
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_push_constants(
                cmd,
                params.pipeline.layout,
                PUSH_CONSTANT_STAGES,
                0,
                bytemuck::bytes_of(&params.push_constants),
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[params.vertex_buffer], &[0]);
            device.cmd_draw(cmd, params.vertex_count, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Also frees every buffer allocated from it
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
