use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::DeviceProvider,
    instruction::transfer::{OutputTarget, run_transfer},
    tensor::{TensorId, TensorPool, TensorState},
    utils::error::ExecutionError,
};

#[derive(Clone, PartialEq, Eq)]
pub struct ToDeviceOp {
    pub input: TensorId,
    pub output: OutputTarget,
}

impl Debug for ToDeviceOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.output {
            OutputTarget::InPlace => write!(f, "ToDevice(src={}, in_place)", self.input),
            OutputTarget::New(dst) => write!(f, "ToDevice(src={}, dst={})", self.input, dst),
        }
    }
}

impl ToDeviceOp {
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
            TensorState::DeviceResident,
            "to_device",
            |provider, handle| provider.host_to_device(handle),
        )
    }
}
