use std::{ptr, sync::Arc};

use tracing::info;
use vulkanalia::{
    Device, Entry, Instance,
    loader::{LIBRARY, LibloadingLoader},
    vk::{self, DeviceV1_0, InstanceV1_0},
};

use crate::{
    device::{host::memory_tracker::MemoryTracker, vulkan::gpu_memory::GpuMemory},
    utils::{error::DeviceError, format::format_memory_mb},
};

pub struct Gpu {
    _entry: Entry,
    instance: Instance,
    device: Device,
    physical_device: vk::PhysicalDevice,
    memory_tracker: MemoryTracker,
}

impl Gpu {
    pub fn new(device_index: usize) -> Result<Self, DeviceError> {
        unsafe {
            let loader =
                LibloadingLoader::new(LIBRARY).map_err(|e| DeviceError::Vulkan(e.to_string()))?;
            let entry = Entry::new(loader).map_err(|e| DeviceError::Vulkan(e.to_string()))?;
            let aname = c"tensorexec";

            let appinfo = vk::ApplicationInfo {
                s_type: vk::StructureType::APPLICATION_INFO,
                next: ptr::null(),
                application_name: aname.as_ptr(),
                application_version: vk::make_version(1, 0, 0),
                engine_name: aname.as_ptr(),
                engine_version: vk::make_version(1, 0, 0),
                api_version: vk::make_version(1, 0, 0),
            };

            let create_info = vk::InstanceCreateInfo {
                s_type: vk::StructureType::INSTANCE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::InstanceCreateFlags::empty(),
                application_info: &appinfo,
                enabled_layer_count: 0,
                enabled_layer_names: ptr::null(),
                enabled_extension_count: 0,
                enabled_extension_names: ptr::null(),
            };

            let instance = entry.create_instance(&create_info, None)?;

            let physical_devices = match instance.enumerate_physical_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(e.into());
                }
            };
            let Some(physical_device) = physical_devices.get(device_index).copied() else {
                instance.destroy_instance(None);
                return Err(DeviceError::Vulkan(format!(
                    "GPU index {} out of range ({} devices)",
                    device_index,
                    physical_devices.len()
                )));
            };

            let queue_family_index = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .enumerate()
                .find(|(_, properties)| properties.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map(|(index, _)| index as u32);
            let Some(queue_family_index) = queue_family_index else {
                instance.destroy_instance(None);
                return Err(DeviceError::Vulkan("No compute queue family found".into()));
            };

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceQueueCreateFlags::empty(),
                queue_family_index,
                queue_count: 1,
                queue_priorities: queue_priorities.as_ptr(),
            };

            let device_features = vk::PhysicalDeviceFeatures::default();

            let device_create_info = vk::DeviceCreateInfo {
                s_type: vk::StructureType::DEVICE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceCreateFlags::empty(),
                queue_create_info_count: 1,
                queue_create_infos: &queue_info,
                enabled_layer_count: 0,
                enabled_layer_names: ptr::null(),
                enabled_extension_count: 0,
                enabled_extension_names: ptr::null(),
                enabled_features: &device_features,
            };

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    instance.destroy_instance(None);
                    return Err(e.into());
                }
            };

            let memory_properties = instance.get_physical_device_memory_properties(physical_device);
            let total_memory = {
                let device_local_heap_index = (0..memory_properties.memory_type_count)
                    .find(|&i| {
                        memory_properties.memory_types[i as usize]
                            .property_flags
                            .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
                    })
                    .map(|i| memory_properties.memory_types[i as usize].heap_index)
                    .unwrap_or(0);

                memory_properties.memory_heaps[device_local_heap_index as usize].size
            };

            // 60% of the device-local heap
            let budget = (total_memory as f64 * 0.6) as u64;
            info!(
                "vulkan gpu {} ready, budget {}",
                device_index,
                format_memory_mb(budget)
            );

            Ok(Self {
                _entry: entry,
                instance,
                device,
                physical_device,
                memory_tracker: MemoryTracker::new(budget),
            })
        }
    }

    pub fn get_device(&self) -> &Device {
        &self.device
    }

    pub fn memory_tracker(&self) -> &MemoryTracker {
        &self.memory_tracker
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32, DeviceError> {
        let mem_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };

        (0..mem_properties.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0
                    && mem_properties.memory_types[i as usize]
                        .property_flags
                        .contains(properties)
            })
            .ok_or_else(|| DeviceError::Vulkan("Failed to find suitable memory type".into()))
    }

    /// Creates a host-visible storage buffer of `size` bytes, counted against the budget.
    pub fn create_buffer(self: &Arc<Self>, size: u64) -> Result<GpuMemory, DeviceError> {
        // zero-sized buffers are invalid in Vulkan
        let size_in_bytes = size.max(1) as vk::DeviceSize;
        self.memory_tracker.allocate(size_in_bytes)?;

        let result = unsafe { self.create_buffer_unchecked(size_in_bytes) };
        if result.is_err() {
            self.memory_tracker.deallocate(size_in_bytes);
        }
        result
    }

    unsafe fn create_buffer_unchecked(
        self: &Arc<Self>,
        size_in_bytes: vk::DeviceSize,
    ) -> Result<GpuMemory, DeviceError> {
        let buffer_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            next: ptr::null(),
            flags: vk::BufferCreateFlags::empty(),
            size: size_in_bytes,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_index_count: 0,
            queue_family_indices: ptr::null(),
        };

        unsafe {
            let buffer = self.device.create_buffer(&buffer_info, None)?;
            let mem_requirements = self.device.get_buffer_memory_requirements(buffer);

            let memory_type = match self.find_memory_type(
                mem_requirements.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ) {
                Ok(memory_type) => memory_type,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };

            let alloc_info = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                next: ptr::null(),
                allocation_size: mem_requirements.size,
                memory_type_index: memory_type,
            };

            let memory = match self.device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(e.into());
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, memory, 0) {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
                return Err(e.into());
            }

            Ok(GpuMemory::new(buffer, memory, size_in_bytes, Arc::clone(self)))
        }
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
