use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::DeviceProvider,
    instruction::transfer::{OutputTarget, run_transfer},
    tensor::{TensorId, TensorPool, TensorState},
    utils::error::ExecutionError,
};

#[derive(Clone, PartialEq, Eq)]
pub struct FromDeviceOp {
    pub input: TensorId,
    pub output: OutputTarget,
}

impl Debug for FromDeviceOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.output {
            OutputTarget::InPlace => write!(f, "FromDevice(src={}, in_place)", self.input),
            OutputTarget::New(dst) => write!(f, "FromDevice(src={}, dst={})", self.input, dst),
        }
    }
}

impl FromDeviceOp {
    /// Calling this on a host tensor is a protocol violation, reported as an
    /// illegal `HostResident -> HostResident` transition.
    pub fn run<P: DeviceProvider>(
        &self,
        pool: &mut TensorPool<P::Handle>,
        provider: &mut P,
    ) -> Result<(), ExecutionError> {
        run_transfer(
            pool,
            provider,
            self.input,
            self.output,
            TensorState::HostResident,
            "from_device",
            |provider, handle| provider.device_to_host(handle),
        )
    }
}
