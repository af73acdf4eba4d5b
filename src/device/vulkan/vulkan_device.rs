use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use tracing::trace;

use crate::{
    device::{
        AllocationSpec, DeviceProvider, Placement, byte_size,
        host::available_host_memory,
        vulkan::{gpu_memory::GpuMemory, vk_gpu::Gpu},
    },
    kernel::Kernel,
    tensor::TensorDesc,
    utils::error::DeviceError,
};

enum Storage {
    Host(Vec<u8>),
    Device(GpuMemory),
}

pub struct VulkanTensor {
    desc: TensorDesc,
    storage: Storage,
}

impl VulkanTensor {
    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn location(&self) -> Placement {
        match self.storage {
            Storage::Host(_) => Placement::Host,
            Storage::Device(_) => Placement::Device,
        }
    }

    fn device_memory(&self) -> Result<&GpuMemory, DeviceError> {
        match &self.storage {
            Storage::Device(memory) => Ok(memory),
            Storage::Host(_) => Err(DeviceError::InvalidHandle(format!(
                "{:?} is not device resident",
                self
            ))),
        }
    }
}

impl Debug for VulkanTensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "VulkanTensor(desc={}, location={:?})",
            self.desc,
            self.location()
        )
    }
}

/// Provider that places device-resident tensors in Vulkan buffers.
///
/// Kernels run on the host: inputs are read back from mapped memory and the
/// result is uploaded into a fresh buffer.
pub struct VulkanDevice {
    gpu: Arc<Gpu>,
    // host-placed tensors live in plain vectors
    max_host_allocation: u64,
    outstanding: usize,
}

impl VulkanDevice {
    pub fn new(device_index: usize) -> Result<Self, DeviceError> {
        Ok(Self {
            gpu: Arc::new(Gpu::new(device_index)?),
            max_host_allocation: available_host_memory(),
            outstanding: 0,
        })
    }

    pub fn outstanding_handles(&self) -> usize {
        self.outstanding
    }

    pub fn device_memory_in_use(&self) -> u64 {
        self.gpu.memory_tracker().get_current()
    }

    fn upload(&self, bytes: &[u8]) -> Result<GpuMemory, DeviceError> {
        let memory = self.gpu.create_buffer(bytes.len() as u64)?;
        memory.copy_into(bytes)?;
        Ok(memory)
    }
}

impl DeviceProvider for VulkanDevice {
    type Handle = VulkanTensor;

    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn allocate(&mut self, spec: &AllocationSpec<'_>) -> Result<VulkanTensor, DeviceError> {
        let size = spec.checked_size()?;
        if spec.placement == Placement::Host && size as u64 > self.max_host_allocation {
            return Err(DeviceError::OutOfMemory {
                requested: size as u64,
                available: self.max_host_allocation,
            });
        }
        // device placements are bounded by the buffer budget before any zeroing
        let storage = match (spec.placement, spec.data) {
            (Placement::Host, Some(data)) => Storage::Host(data.to_vec()),
            (Placement::Host, None) => Storage::Host(vec![0u8; size]),
            (Placement::Device, Some(data)) => Storage::Device(self.upload(data)?),
            (Placement::Device, None) => {
                let memory = self.gpu.create_buffer(size as u64)?;
                memory.copy_into(&vec![0u8; size])?;
                Storage::Device(memory)
            }
        };

        self.outstanding += 1;
        Ok(VulkanTensor {
            desc: spec.desc.clone(),
            storage,
        })
    }

    fn release(&mut self, handle: VulkanTensor, _force: bool) -> Result<(), DeviceError> {
        // buffers have no provider-side references; dropping frees them
        trace!(?handle, "vulkan release");
        self.outstanding = self.outstanding.saturating_sub(1);
        drop(handle);
        Ok(())
    }

    fn host_to_device(&mut self, handle: &mut VulkanTensor) -> Result<(), DeviceError> {
        let memory = match &handle.storage {
            Storage::Host(bytes) => self.upload(bytes)?,
            Storage::Device(_) => {
                return Err(DeviceError::InvalidHandle(format!(
                    "{:?} is already device resident",
                    handle
                )));
            }
        };
        handle.storage = Storage::Device(memory);
        Ok(())
    }

    fn device_to_host(&mut self, handle: &mut VulkanTensor) -> Result<(), DeviceError> {
        let size = byte_size(&handle.desc)?;
        let bytes = handle.device_memory()?.read_memory(size)?;
        // replacing the storage drops and frees the buffer
        handle.storage = Storage::Host(bytes);
        Ok(())
    }

    fn compute(&mut self, kernel: Kernel, inputs: &[&VulkanTensor]) -> Result<VulkanTensor, DeviceError> {
        let descs: Vec<&TensorDesc> = inputs.iter().map(|t| &t.desc).collect();
        let desc = kernel.output_desc(&descs)?;

        let mut host_inputs = Vec::with_capacity(inputs.len());
        for input in inputs {
            let size = byte_size(&input.desc)?;
            host_inputs.push(input.device_memory()?.read_memory(size)?);
        }
        let srcs: Vec<&[u8]> = host_inputs.iter().map(|b| b.as_slice()).collect();
        let result = kernel.run_host(&srcs);

        let memory = self.upload(&result)?;
        self.outstanding += 1;
        Ok(VulkanTensor {
            desc,
            storage: Storage::Device(memory),
        })
    }

    fn read_host(&self, handle: &VulkanTensor) -> Result<Vec<u8>, DeviceError> {
        match &handle.storage {
            Storage::Host(bytes) => Ok(bytes.clone()),
            Storage::Device(_) => Err(DeviceError::InvalidHandle(format!(
                "{:?} is not host resident",
                handle
            ))),
        }
    }
}
