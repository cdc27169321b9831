// Buffers backed by gpu-allocator
//
// The vertex buffer lives in DEVICE_LOCAL memory. Its contents are written
// into a host-visible staging buffer first and copied over with a one-time
// command buffer; the staging buffer is released once the copy has finished.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::{CommandPool, VulkanDevice};
use crate::vertex::Vertex;

/// Usage of the host-visible buffer the vertices are written into
pub const STAGING_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::TRANSFER_SRC;

/// Usage of the device-local buffer the triangle is drawn from
pub const VERTEX_USAGE: vk::BufferUsageFlags = vk::BufferUsageFlags::from_raw(
    vk::BufferUsageFlags::VERTEX_BUFFER.as_raw() | vk::BufferUsageFlags::TRANSFER_DST.as_raw(),
);

/// A buffer plus its memory, freed together
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    pub fn new(
        device: Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Failed to create {} buffer", name))?;

        // Owned from here on; Drop handles a failed allocation or bind
        let mut this = Self {
            buffer,
            size,
            allocation: None,
            device,
        };

        let requirements = unsafe { this.device.device.get_buffer_memory_requirements(buffer) };

        let allocation = this
            .device
            .allocator()
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate {} buffer memory", name))?;

        let bound = unsafe {
            this.device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bound.with_context(|| format!("Failed to bind {} buffer memory", name))?;

        Ok(this)
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            anyhow::bail!("{} bytes do not fit in a {} byte buffer", bytes.len(), self.size);
        }

        let mapped = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;
        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().lock().free(allocation) {
                log::error!("Failed to free buffer memory: {}", e);
            }
        }
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Device-local vertex buffer
pub struct VertexBuffer {
    pub buffer: GpuBuffer,
    pub vertex_count: u32,
}

impl VertexBuffer {
    /// Upload `vertices` through a staging buffer on the graphics queue
    pub fn new(device: Arc<VulkanDevice>, pool: &CommandPool, vertices: &[Vertex]) -> Result<Self> {
        if vertices.is_empty() {
            anyhow::bail!("Vertex buffer needs at least one vertex");
        }

        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as vk::DeviceSize;

        let mut staging = GpuBuffer::new(
            device.clone(),
            "vertex staging",
            size,
            STAGING_USAGE,
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(bytes)?;

        let buffer = GpuBuffer::new(
            device.clone(),
            "vertex",
            size,
            VERTEX_USAGE,
            MemoryLocation::GpuOnly,
        )?;

        let region = copy_region(size);
        pool.submit_once(device.graphics_queue, |cmd| unsafe {
            device
                .device
                .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
        })
        .context("Failed to copy vertices to the GPU")?;

        log::debug!("Uploaded {} vertices ({} bytes)", vertices.len(), bytes.len());

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }
}

/// Whole-buffer copy from offset 0
fn copy_region(size: vk::DeviceSize) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::TRIANGLE;

    #[test]
    fn staging_feeds_a_drawable_buffer() {
        assert!(STAGING_USAGE.contains(vk::BufferUsageFlags::TRANSFER_SRC));
        assert!(VERTEX_USAGE.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(VERTEX_USAGE.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(!STAGING_USAGE.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
    }

    #[test]
    fn copy_covers_the_whole_triangle() {
        let size = bytemuck::cast_slice::<Vertex, u8>(&TRIANGLE).len() as vk::DeviceSize;
        let region = copy_region(size);
        assert_eq!(size, 72);
        assert_eq!((region.src_offset, region.dst_offset, region.size), (0, 0, 72));
    }
}
