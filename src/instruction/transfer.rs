use crate::{
    device::DeviceProvider,
    tensor::{TensorId, TensorPool, TensorState},
    utils::error::{DeviceError, ExecutionError},
};

/// Destination of a residency transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// The input identifier changes residency.
    InPlace,
    /// The input identifier is consumed and its storage reappears under a fresh identifier.
    New(TensorId),
}

/// Shared body of the two transfer handlers: validate, move the storage
/// through `transfer`, then apply the pool mutation.
pub(crate) fn run_transfer<P: DeviceProvider>(
    pool: &mut TensorPool<P::Handle>,
    provider: &mut P,
    input: TensorId,
    output: OutputTarget,
    to: TensorState,
    operation: &'static str,
    transfer: impl FnOnce(&mut P, &mut P::Handle) -> Result<(), DeviceError>,
) -> Result<(), ExecutionError> {
    pool.check_transition(input, to)?;
    if let OutputTarget::New(out) = output {
        pool.ensure_fresh(out)?;
    }

    let entry = pool.get_mut(input)?;
    transfer(provider, entry.handle_mut()).map_err(|e| ExecutionError::device(operation, e))?;

    match output {
        OutputTarget::InPlace => {
            pool.transition(input, to)?;
        }
        OutputTarget::New(out) => {
            let handle = pool.consume(input, out)?;
            pool.insert(out, handle, to)?;
        }
    }
    Ok(())
}
