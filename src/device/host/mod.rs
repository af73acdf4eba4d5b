mod host_device;
pub mod memory_tracker;

pub(crate) use host_device::available_host_memory;
pub use host_device::{DeviceOp, HostDevice, HostDeviceConfig, HostTensor};
