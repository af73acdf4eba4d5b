//! Device capability providers.
//!
//! The executor never touches tensor storage itself. Every effect on a
//! tensor (allocation, release, transfer, compute) goes through a
//! [`DeviceProvider`] passed in by the caller, which makes the device a
//! substitutable capability rather than ambient global state.

pub mod host;
pub mod vulkan;

use crate::{
    kernel::Kernel,
    tensor::{TensorDesc, TensorState},
    utils::error::DeviceError,
};

/// Where an allocation should live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    Host,
    Device,
}

impl Placement {
    pub fn state(self) -> TensorState {
        match self {
            Placement::Host => TensorState::HostResident,
            Placement::Device => TensorState::DeviceResident,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Placement::Host => 0,
            Placement::Device => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Placement::Host),
            1 => Some(Placement::Device),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AllocationSpec<'a> {
    pub desc: &'a TensorDesc,
    pub placement: Placement,
    /// Initial contents. Zero-filled when absent.
    pub data: Option<&'a [u8]>,
}

impl<'a> AllocationSpec<'a> {
    pub fn new(desc: &'a TensorDesc, placement: Placement) -> Self {
        Self {
            desc,
            placement,
            data: None,
        }
    }

    pub fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = Some(data);
        self
    }

    /// Byte size of the allocation, checking any initial data against it.
    pub(crate) fn checked_size(&self) -> Result<usize, DeviceError> {
        let size = byte_size(self.desc)?;
        match self.data {
            Some(data) if data.len() != size => Err(DeviceError::InvalidArgument(format!(
                "initial data is {} bytes but {} needs {}",
                data.len(),
                self.desc,
                size
            ))),
            _ => Ok(size),
        }
    }
}

/// Byte size of a tensor, or `InvalidArgument` if it cannot be addressed.
pub(crate) fn byte_size(desc: &TensorDesc) -> Result<usize, DeviceError> {
    desc.size_in_bytes().ok_or_else(|| {
        DeviceError::InvalidArgument(format!("{} is too large to address", desc))
    })
}

/// The narrow interface through which the executor reaches a device.
///
/// Handles are owned by the executor's tensor pool between calls. Transfers
/// receive exclusive access to the handle and update it in place; on failure
/// the handle must be left in a state that can still be released.
pub trait DeviceProvider {
    type Handle;

    fn name(&self) -> &'static str;

    fn allocate(&mut self, spec: &AllocationSpec<'_>) -> Result<Self::Handle, DeviceError>;

    /// Reclaims `handle`. With `force`, release proceeds even if the
    /// provider still holds references to the storage.
    fn release(&mut self, handle: Self::Handle, force: bool) -> Result<(), DeviceError>;

    fn host_to_device(&mut self, handle: &mut Self::Handle) -> Result<(), DeviceError>;

    fn device_to_host(&mut self, handle: &mut Self::Handle) -> Result<(), DeviceError>;

    /// Runs `kernel` over device-resident inputs, producing a new device-resident tensor.
    fn compute(&mut self, kernel: Kernel, inputs: &[&Self::Handle]) -> Result<Self::Handle, DeviceError>;

    /// Reads back the contents of a host-resident handle. Used by callers to
    /// inspect program outputs; the executor never calls it.
    fn read_host(&self, handle: &Self::Handle) -> Result<Vec<u8>, DeviceError>;
}

impl<P: DeviceProvider + ?Sized> DeviceProvider for &mut P {
    type Handle = P::Handle;

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn allocate(&mut self, spec: &AllocationSpec<'_>) -> Result<Self::Handle, DeviceError> {
        (**self).allocate(spec)
    }

    fn release(&mut self, handle: Self::Handle, force: bool) -> Result<(), DeviceError> {
        (**self).release(handle, force)
    }

    fn host_to_device(&mut self, handle: &mut Self::Handle) -> Result<(), DeviceError> {
        (**self).host_to_device(handle)
    }

    fn device_to_host(&mut self, handle: &mut Self::Handle) -> Result<(), DeviceError> {
        (**self).device_to_host(handle)
    }

    fn compute(&mut self, kernel: Kernel, inputs: &[&Self::Handle]) -> Result<Self::Handle, DeviceError> {
        (**self).compute(kernel, inputs)
    }

    fn read_host(&self, handle: &Self::Handle) -> Result<Vec<u8>, DeviceError> {
        (**self).read_host(handle)
    }
}
