use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::DeviceProvider,
    kernel::Kernel,
    tensor::{TensorId, TensorPool, TensorState},
    utils::error::{ExecutionError, ProtocolError},
};

#[derive(Clone, PartialEq, Eq)]
pub struct ComputeOp {
    pub kernel: Kernel,
    pub inputs: Vec<TensorId>,
    pub output: TensorId,
}

impl Debug for ComputeOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Compute({:?}, srcs={:?}, dst={})",
            self.kernel, self.inputs, self.output
        )
    }
}

impl ComputeOp {
    pub fn run<P: DeviceProvider>(
        &self,
        pool: &mut TensorPool<P::Handle>,
        provider: &mut P,
    ) -> Result<(), ExecutionError> {
        if self.inputs.len() != self.kernel.arity() {
            return Err(ProtocolError::ArityMismatch {
                kernel: self.kernel.name(),
                expected: self.kernel.arity(),
                actual: self.inputs.len(),
            }
            .into());
        }
        for &id in &self.inputs {
            let state = pool.get(id)?.state();
            if state != TensorState::DeviceResident {
                return Err(ExecutionError::ResidencyMismatch {
                    id,
                    expected: TensorState::DeviceResident,
                    actual: state,
                });
            }
        }
        pool.ensure_fresh(self.output)?;

        let handle = {
            let mut handles = Vec::with_capacity(self.inputs.len());
            for &id in &self.inputs {
                handles.push(pool.get(id)?.handle());
            }
            provider
                .compute(self.kernel, &handles)
                .map_err(|e| ExecutionError::device("compute", e))?
        };

        pool.insert(self.output, handle, TensorState::DeviceResident)?;
        Ok(())
    }
}
