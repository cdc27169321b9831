// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one Vulkan concern per file.
// Each wrapper owns its handles and destroys them on Drop.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::VertexBuffer;
pub use commands::{CommandPool, DrawParams};
pub use device::VulkanDevice;
pub use pipeline::{Framebuffers, GraphicsPipeline, RenderPass};
pub use shader::{ShaderCompiler, ShaderSource, ShaderStage};
pub use swapchain::{Acquired, Swapchain};
pub use sync::{FrameSync, PresentSemaphores};
