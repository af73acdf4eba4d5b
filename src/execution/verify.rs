//! Static program check.
//!
//! Replays every record through the real dispatcher against a pool whose
//! handles are bare descriptors, so protocol and state violations surface
//! before a device is involved.

use crate::{
    device::{AllocationSpec, DeviceProvider},
    instruction::dispatch,
    kernel::Kernel,
    program::Program,
    tensor::{TensorDesc, TensorPool, TensorState},
    utils::error::{DeviceError, ExecutionError, PoolError, ProtocolError},
};

/// Provider whose handle is the tensor's descriptor. Compute still checks
/// operand shapes and dtypes through [`Kernel::output_desc`].
struct ShadowDevice;

impl DeviceProvider for ShadowDevice {
    type Handle = TensorDesc;

    fn name(&self) -> &'static str {
        "shadow"
    }

    fn allocate(&mut self, spec: &AllocationSpec<'_>) -> Result<TensorDesc, DeviceError> {
        spec.checked_size()?;
        Ok(spec.desc.clone())
    }

    fn release(&mut self, _handle: TensorDesc, _force: bool) -> Result<(), DeviceError> {
        Ok(())
    }

    fn host_to_device(&mut self, _handle: &mut TensorDesc) -> Result<(), DeviceError> {
        Ok(())
    }

    fn device_to_host(&mut self, _handle: &mut TensorDesc) -> Result<(), DeviceError> {
        Ok(())
    }

    fn compute(&mut self, kernel: Kernel, inputs: &[&TensorDesc]) -> Result<TensorDesc, DeviceError> {
        kernel.output_desc(inputs)
    }

    fn read_host(&self, _handle: &TensorDesc) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::Unsupported("shadow tensors carry no data".to_string()))
    }
}

/// Returns the first violation and the record it occurred at, `None` for
/// violations in the input or output declarations.
pub fn verify(program: &Program) -> Result<(), (Option<usize>, ExecutionError)> {
    let mut pool = TensorPool::new();
    let mut device = ShadowDevice;

    for input in &program.inputs {
        pool.insert(input.id, input.desc.clone(), TensorState::HostResident)
            .map_err(|e| {
                let error: ExecutionError = match e {
                    PoolError::DuplicateIdentifier(id) => ProtocolError::DuplicateInput(id).into(),
                    other => other.into(),
                };
                (None, error)
            })?;
    }

    for (index, op) in program.records.iter().enumerate() {
        dispatch(op, &mut pool, &mut device).map_err(|e| (Some(index), e))?;
    }

    for &id in &program.outputs {
        if !pool.contains(id) {
            return Err((None, ProtocolError::MissingOutput(id).into()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::Placement,
        instruction::OutputTarget,
        program::ProgramBuilder,
        tensor::DataType,
        utils::error::ErrorKind,
    };

    fn desc(n: u32) -> TensorDesc {
        TensorDesc::new(vec![n], DataType::F32)
    }

    #[test]
    fn accepts_well_formed_program() {
        let program = ProgramBuilder::new()
            .input(1, desc(4))
            .to_device(1, OutputTarget::InPlace)
            .allocate(2, desc(4), Placement::Device)
            .compute(Kernel::Multiply, &[1, 2], 3)
            .from_device(3, OutputTarget::InPlace)
            .deallocate(2, false)
            .output(3)
            .build();
        assert_eq!(verify(&program), Ok(()));
    }

    #[test]
    fn reports_first_violation_with_index() {
        let program = ProgramBuilder::new()
            .allocate(1, desc(4), Placement::Device)
            .deallocate(1, false)
            .deallocate(1, false)
            .deallocate(9, false)
            .build();
        let (record, error) = verify(&program).unwrap_err();
        assert_eq!(record, Some(2));
        assert_eq!(error.kind(), ErrorKind::IllegalStateTransition);
    }

    #[test]
    fn catches_kernel_shape_mismatch() {
        let program = ProgramBuilder::new()
            .allocate(1, desc(4), Placement::Device)
            .allocate(2, desc(8), Placement::Device)
            .compute(Kernel::Add, &[1, 2], 3)
            .build();
        let (record, error) = verify(&program).unwrap_err();
        assert_eq!(record, Some(2));
        assert_eq!(error.kind(), ErrorKind::Device);
    }

    #[test]
    fn unaddressable_allocation_is_a_device_error() {
        let huge = TensorDesc::new(vec![u32::MAX, u32::MAX, u32::MAX], DataType::F32);
        let program = ProgramBuilder::new()
            .allocate(1, huge, Placement::Host)
            .build();
        let (record, error) = verify(&program).unwrap_err();
        assert_eq!(record, Some(0));
        assert!(matches!(
            error,
            ExecutionError::Device {
                source: DeviceError::InvalidArgument(_),
                ..
            }
        ));
    }

    #[test]
    fn outputs_must_survive() {
        let program = ProgramBuilder::new()
            .allocate(1, desc(4), Placement::Host)
            .deallocate(1, true)
            .output(1)
            .build();
        assert_eq!(
            verify(&program),
            Err((None, ProtocolError::MissingOutput(1).into()))
        );
    }

    #[test]
    fn duplicate_input_declaration() {
        let program = ProgramBuilder::new().input(5, desc(1)).input(5, desc(1)).build();
        assert_eq!(
            verify(&program),
            Err((None, ProtocolError::DuplicateInput(5).into()))
        );
    }
}
