use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::{AllocationSpec, DeviceProvider, Placement},
    tensor::{TensorDesc, TensorId, TensorPool},
    utils::error::ExecutionError,
};

#[derive(Clone, PartialEq, Eq)]
pub struct AllocateOp {
    pub output: TensorId,
    pub desc: TensorDesc,
    pub placement: Placement,
}

impl Debug for AllocateOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "Allocate(dst={}, desc={}, placement={:?})",
            self.output, self.desc, self.placement
        )
    }
}

impl AllocateOp {
    pub fn run<P: DeviceProvider>(
        &self,
        pool: &mut TensorPool<P::Handle>,
        provider: &mut P,
    ) -> Result<(), ExecutionError> {
        pool.ensure_fresh(self.output)?;

        let handle = provider
            .allocate(&AllocationSpec::new(&self.desc, self.placement))
            .map_err(|e| ExecutionError::device("allocate", e))?;

        pool.insert(self.output, handle, self.placement.state())?;
        Ok(())
    }
}
