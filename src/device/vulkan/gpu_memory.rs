use std::sync::Arc;

use vulkanalia::vk::{self, DeviceV1_0};

use crate::{device::vulkan::vk_gpu::Gpu, utils::error::DeviceError};

/// A bound, host-visible Vulkan buffer. Keeps its [`Gpu`] alive and frees
/// itself on drop.
pub struct GpuMemory {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    gpu: Arc<Gpu>,
}

impl GpuMemory {
    pub fn new(
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
        gpu: Arc<Gpu>,
    ) -> Self {
        Self {
            buffer,
            memory,
            size,
            gpu,
        }
    }

    /// Copy raw bytes into GPU memory.
    pub fn copy_into(&self, data: &[u8]) -> Result<(), DeviceError> {
        let data_size = data.len() as vk::DeviceSize;

        if data_size > self.size {
            return Err(DeviceError::InvalidArgument(format!(
                "Data size {} exceeds GPU buffer size {}",
                data_size, self.size
            )));
        }
        if data.is_empty() {
            return Ok(());
        }

        let device = self.gpu.get_device();
        unsafe {
            let data_ptr =
                device.map_memory(self.memory, 0, data_size, vk::MemoryMapFlags::empty())?
                    as *mut u8;

            std::ptr::copy_nonoverlapping(data.as_ptr(), data_ptr, data.len());

            device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Read the first `len` bytes from GPU memory.
    pub fn read_memory(&self, len: usize) -> Result<Vec<u8>, DeviceError> {
        let len = len.min(self.size as usize);
        let mut output_data = vec![0u8; len];
        if len == 0 {
            return Ok(output_data);
        }

        let device = self.gpu.get_device();
        unsafe {
            let data_ptr = device.map_memory(
                self.memory,
                0,
                len as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )? as *const u8;

            std::ptr::copy_nonoverlapping(data_ptr, output_data.as_mut_ptr(), len);

            device.unmap_memory(self.memory);
        }

        Ok(output_data)
    }
}

impl Drop for GpuMemory {
    fn drop(&mut self) {
        let device = self.gpu.get_device();
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
        self.gpu.memory_tracker().deallocate(self.size);
    }
}
