pub mod gpu_memory;
pub mod vk_gpu;
mod vulkan_device;

pub use vulkan_device::{VulkanDevice, VulkanTensor};
