use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::DeviceProvider,
    tensor::{TensorId, TensorPool},
    utils::error::ExecutionError,
};

#[derive(Clone, PartialEq, Eq)]
pub struct DeallocateOp {
    pub input: TensorId,
    pub force: bool,
}

impl Debug for DeallocateOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Deallocate(src={}, force={})", self.input, self.force)
    }
}

impl DeallocateOp {
    /// The identifier is retired before the provider sees the handle, so a
    /// failed release still leaves the identifier freed: the storage now
    /// belongs to the provider.
    pub fn run<P: DeviceProvider>(
        &self,
        pool: &mut TensorPool<P::Handle>,
        provider: &mut P,
    ) -> Result<(), ExecutionError> {
        let handle = pool.remove(self.input)?;
        provider
            .release(handle, self.force)
            .map_err(|e| ExecutionError::device("deallocate", e))
    }
}
