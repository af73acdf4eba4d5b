use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::{debug, trace};

use crate::{
    device::{
        AllocationSpec, DeviceProvider, Placement, byte_size, host::memory_tracker::MemoryTracker,
    },
    kernel::Kernel,
    tensor::TensorDesc,
    utils::{error::DeviceError, format::format_memory_mb},
};

const FALLBACK_HOST_MEMORY: u64 = 1 << 30;

/// Host memory currently available, or 1 GiB when it cannot be queried.
pub(crate) fn available_host_memory() -> u64 {
    match sys_info::mem_info() {
        // mem_info reports KiB
        Ok(info) => info.avail.saturating_mul(1024),
        Err(_) => FALLBACK_HOST_MEMORY,
    }
}

#[derive(Clone, Debug, Default)]
pub struct HostDeviceConfig {
    /// Budget for device-resident bytes. Defaults to 60% of available host memory.
    pub device_memory_bytes: Option<u64>,
    /// Largest single allocation in either placement. Defaults to available host memory.
    pub max_allocation_bytes: Option<u64>,
}

impl HostDeviceConfig {
    pub fn with_device_memory(mut self, bytes: u64) -> Self {
        self.device_memory_bytes = Some(bytes);
        self
    }

    pub fn with_max_allocation(mut self, bytes: u64) -> Self {
        self.max_allocation_bytes = Some(bytes);
        self
    }

    fn resolve_device_memory(&self) -> u64 {
        match self.device_memory_bytes {
            Some(bytes) => bytes,
            None => (available_host_memory() as f64 * 0.6) as u64,
        }
    }

    fn resolve_max_allocation(&self) -> u64 {
        self.max_allocation_bytes
            .unwrap_or_else(available_host_memory)
    }
}

/// Provider operations, used to arm injected failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    Allocate,
    Release,
    HostToDevice,
    DeviceToHost,
    Compute,
}

pub struct HostTensor {
    serial: u64,
    desc: TensorDesc,
    location: Placement,
    bytes: Vec<u8>,
}

impl HostTensor {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn location(&self) -> Placement {
        self.location
    }
}

impl Debug for HostTensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "HostTensor(serial={}, desc={}, location={:?})",
            self.serial, self.desc, self.location
        )
    }
}

/// Reference provider that keeps every tensor's bytes in host memory.
///
/// "Device" residency is bookkeeping against a memory budget; contents are
/// preserved across transfers byte for byte. The provider also counts
/// outstanding handles, so callers can check that a run released
/// everything it allocated.
pub struct HostDevice {
    memory: MemoryTracker,
    max_allocation: u64,
    next_serial: u64,
    outstanding: HashSet<u64>,
    pins: HashMap<u64, usize>,
    // handed to release but still referenced, reclaimed on unpin
    deferred: HashMap<u64, HostTensor>,
    released: Vec<u64>,
    armed_failures: HashSet<DeviceOp>,
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(HostDeviceConfig::default())
    }
}

impl HostDevice {
    pub fn new(config: HostDeviceConfig) -> Self {
        let budget = config.resolve_device_memory();
        let max_allocation = config.resolve_max_allocation();
        debug!(
            "host device budget {}, largest allocation {}",
            format_memory_mb(budget),
            format_memory_mb(max_allocation)
        );
        Self {
            memory: MemoryTracker::new(budget),
            max_allocation,
            next_serial: 1,
            outstanding: HashSet::new(),
            pins: HashMap::new(),
            deferred: HashMap::new(),
            released: Vec::new(),
            armed_failures: HashSet::new(),
        }
    }

    /// Allocates a host-resident tensor holding `data`, ready to bind as a program input.
    pub fn host_tensor(&mut self, desc: &TensorDesc, data: &[u8]) -> Result<HostTensor, DeviceError> {
        self.allocate(&AllocationSpec::new(desc, Placement::Host).with_data(data))
    }

    /// Handles allocated and not yet passed to `release`.
    pub fn outstanding_handles(&self) -> usize {
        self.outstanding.len()
    }

    /// Serials in the order `release` accepted them.
    pub fn released(&self) -> &[u64] {
        &self.released
    }

    pub fn deferred_releases(&self) -> usize {
        self.deferred.len()
    }

    pub fn device_memory_in_use(&self) -> u64 {
        self.memory.get_current()
    }

    pub fn device_memory_available(&self) -> u64 {
        self.memory.get_available()
    }

    /// Serial the next allocation will receive.
    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }

    /// Records a provider-side reference on `serial`. A non-forced release of a
    /// pinned handle fails with [`DeviceError::PendingReferences`].
    pub fn pin(&mut self, serial: u64) {
        *self.pins.entry(serial).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, serial: u64) {
        let Some(count) = self.pins.get_mut(&serial) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.pins.remove(&serial);
            if let Some(tensor) = self.deferred.remove(&serial) {
                trace!(serial, "reclaiming deferred release");
                self.reclaim(tensor);
            }
        }
    }

    /// Makes the next call of `op` fail with a backend error.
    pub fn fail_next(&mut self, op: DeviceOp) {
        self.armed_failures.insert(op);
    }

    fn injected(&mut self, op: DeviceOp) -> Result<(), DeviceError> {
        if self.armed_failures.remove(&op) {
            return Err(DeviceError::Backend(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn check_allocation(&self, size: usize) -> Result<(), DeviceError> {
        let requested = size as u64;
        if requested > self.max_allocation {
            return Err(DeviceError::OutOfMemory {
                requested,
                available: self.max_allocation,
            });
        }
        Ok(())
    }

    fn check_live(&self, tensor: &HostTensor) -> Result<(), DeviceError> {
        if !self.outstanding.contains(&tensor.serial) {
            return Err(DeviceError::InvalidHandle(format!(
                "{:?} is not owned by this device",
                tensor
            )));
        }
        Ok(())
    }

    fn check_location(tensor: &HostTensor, expected: Placement) -> Result<(), DeviceError> {
        if tensor.location != expected {
            return Err(DeviceError::InvalidHandle(format!(
                "{:?} is not {:?} resident",
                tensor, expected
            )));
        }
        Ok(())
    }

    fn reclaim(&mut self, tensor: HostTensor) {
        if tensor.location == Placement::Device {
            self.memory.deallocate(tensor.bytes.len() as u64);
        }
    }

    fn issue(&mut self, desc: TensorDesc, location: Placement, bytes: Vec<u8>) -> HostTensor {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.outstanding.insert(serial);
        HostTensor {
            serial,
            desc,
            location,
            bytes,
        }
    }
}

impl DeviceProvider for HostDevice {
    type Handle = HostTensor;

    fn name(&self) -> &'static str {
        "host"
    }

    fn allocate(&mut self, spec: &AllocationSpec<'_>) -> Result<HostTensor, DeviceError> {
        self.injected(DeviceOp::Allocate)?;
        let size = spec.checked_size()?;
        self.check_allocation(size)?;
        if spec.placement == Placement::Device {
            self.memory.allocate(size as u64)?;
        }

        let bytes = match spec.data {
            Some(data) => data.to_vec(),
            None => vec![0u8; size],
        };
        Ok(self.issue(spec.desc.clone(), spec.placement, bytes))
    }

    fn release(&mut self, handle: HostTensor, force: bool) -> Result<(), DeviceError> {
        self.check_live(&handle)?;
        let serial = handle.serial;
        self.outstanding.remove(&serial);

        if let Err(e) = self.injected(DeviceOp::Release) {
            self.deferred.insert(serial, handle);
            return Err(e);
        }

        if !force && self.pins.contains_key(&serial) {
            self.deferred.insert(serial, handle);
            return Err(DeviceError::PendingReferences(serial));
        }

        self.pins.remove(&serial);
        self.reclaim(handle);
        self.released.push(serial);
        Ok(())
    }

    fn host_to_device(&mut self, handle: &mut HostTensor) -> Result<(), DeviceError> {
        self.injected(DeviceOp::HostToDevice)?;
        self.check_live(handle)?;
        Self::check_location(handle, Placement::Host)?;

        self.memory.allocate(handle.bytes.len() as u64)?;
        handle.location = Placement::Device;
        Ok(())
    }

    fn device_to_host(&mut self, handle: &mut HostTensor) -> Result<(), DeviceError> {
        self.injected(DeviceOp::DeviceToHost)?;
        self.check_live(handle)?;
        Self::check_location(handle, Placement::Device)?;

        self.memory.deallocate(handle.bytes.len() as u64);
        handle.location = Placement::Host;
        Ok(())
    }

    fn compute(&mut self, kernel: Kernel, inputs: &[&HostTensor]) -> Result<HostTensor, DeviceError> {
        self.injected(DeviceOp::Compute)?;
        for input in inputs {
            self.check_live(input)?;
            Self::check_location(input, Placement::Device)?;
        }

        let descs: Vec<&TensorDesc> = inputs.iter().map(|t| &t.desc).collect();
        let desc = kernel.output_desc(&descs)?;
        let size = byte_size(&desc)?;
        self.check_allocation(size)?;
        self.memory.allocate(size as u64)?;

        let srcs: Vec<&[u8]> = inputs.iter().map(|t| t.bytes.as_slice()).collect();
        let bytes = kernel.run_host(&srcs);
        Ok(self.issue(desc, Placement::Device, bytes))
    }

    fn read_host(&self, handle: &HostTensor) -> Result<Vec<u8>, DeviceError> {
        self.check_live(handle)?;
        Self::check_location(handle, Placement::Host)?;
        Ok(handle.bytes.clone())
    }
}
