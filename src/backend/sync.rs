// Synchronization primitives
//
// Per frame in flight (FrameSync):
// - image_available: swapchain image is ready to be rendered into (GPU-GPU)
// - in_flight_fence: GPU finished this slot's commands (GPU-CPU)
//
// Per swapchain image (PresentSemaphores):
// - render_finished: rendering done, image may be presented (GPU-GPU)
//
// A slot's fence says nothing about when the presentation engine is done
// waiting on the semaphore handed to vkQueuePresentKHR. An image is only
// acquired again once its previous present has consumed that wait, so
// render_finished is keyed by image index rather than by slot.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::builder()
            .flags(vk::FenceCreateFlags::SIGNALED);

        let image_available = unsafe { device.device.create_semaphore(&semaphore_info, None) }
            .context("Failed to create semaphore")?;

        let in_flight_fence = match unsafe { device.device.create_fence(&fence_info, None) } {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { device.device.destroy_semaphore(image_available, None) };
                return Err(e).context("Failed to create fence");
            }
        };

        Ok(Self {
            image_available,
            in_flight_fence,
            device,
        })
    }

    /// Block until the GPU is done with this slot
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
        }
        .context("Failed waiting for in-flight fence")
    }

    /// Only reset once work is definitely going to be submitted, or the next
    /// wait on this slot deadlocks.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.device.reset_fences(&[self.in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// One `render_finished` semaphore per swapchain image.
///
/// Rebuilt together with the swapchain, since the image count may change.
pub struct PresentSemaphores {
    semaphores: Vec<vk::Semaphore>,
    device: Arc<VulkanDevice>,
}

impl PresentSemaphores {
    pub fn new(device: Arc<VulkanDevice>, image_count: usize) -> Result<Self> {
        let mut this = Self {
            semaphores: Vec::with_capacity(image_count),
            device,
        };

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        for _ in 0..image_count {
            // Drop releases whatever was created before a failure
            let semaphore = unsafe { this.device.device.create_semaphore(&semaphore_info, None) }
                .context("Failed to create render-finished semaphore")?;
            this.semaphores.push(semaphore);
        }

        Ok(this)
    }

    /// Semaphore signalled when rendering into `image_index` completes
    pub fn for_image(&self, image_index: u32) -> Option<vk::Semaphore> {
        image_slot(image_index, self.semaphores.len()).map(|slot| self.semaphores[slot])
    }
}

impl Drop for PresentSemaphores {
    fn drop(&mut self) {
        for &semaphore in &self.semaphores {
            unsafe { self.device.device.destroy_semaphore(semaphore, None) };
        }
    }
}

/// Index into a per-image array, or None for an index the swapchain never handed out
fn image_slot(image_index: u32, image_count: usize) -> Option<usize> {
    let slot = image_index as usize;
    (slot < image_count).then_some(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semaphore_follows_the_image_not_the_frame_slot() {
        // Two frames in flight over three images: slot 0 renders images 0, 2, 1, ...
        let frames_in_flight = 2;
        let image_count = 3;
        let acquired = [0u32, 1, 2, 0, 1, 2];

        for (frame, &image) in acquired.iter().enumerate() {
            let slot = frame % frames_in_flight;
            let semaphore = image_slot(image, image_count).unwrap();
            assert_eq!(semaphore, image as usize);
            if frame >= frames_in_flight {
                // The slot comes round again on a different image, and so
                // signals a different semaphore than its previous frame did
                let previous = acquired[frame - frames_in_flight];
                assert_eq!(slot, (frame - frames_in_flight) % frames_in_flight);
                assert_ne!(image_slot(previous, image_count), Some(semaphore));
            }
        }
    }

    #[test]
    fn unknown_image_index_has_no_semaphore() {
        assert_eq!(image_slot(2, 3), Some(2));
        assert_eq!(image_slot(3, 3), None);
        assert_eq!(image_slot(0, 0), None);
    }
}
