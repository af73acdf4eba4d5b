//! Operation dispatcher.
//!
//! Every operation kind is a variant of the closed [`Operation`] enum and
//! [`dispatch`] matches it exhaustively, so a new kind without a handler is
//! a build error. Handlers validate against the pool before touching the
//! device, and mutate the pool only after the device call succeeded.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use crate::{
    device::{DeviceProvider, Placement},
    instruction::{
        allocate::AllocateOp, compute::ComputeOp, deallocate::DeallocateOp,
        from_device::FromDeviceOp, to_device::ToDeviceOp,
    },
    kernel::Kernel,
    tensor::{TensorDesc, TensorId, TensorPool},
    utils::error::ExecutionError,
};

pub mod allocate;
pub mod compute;
pub mod deallocate;
pub mod from_device;
pub mod to_device;
pub mod transfer;

pub use transfer::OutputTarget;

#[derive(Clone, PartialEq, Eq)]
pub enum Operation {
    Allocate(AllocateOp),
    ToDevice(ToDeviceOp),
    FromDevice(FromDeviceOp),
    Deallocate(DeallocateOp),
    Compute(ComputeOp),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Allocate(_) => "allocate",
            Operation::ToDevice(_) => "to_device",
            Operation::FromDevice(_) => "from_device",
            Operation::Deallocate(_) => "deallocate",
            Operation::Compute(_) => "compute",
        }
    }

    // Identifiers that must already be live
    pub fn input_ids(&self) -> Vec<TensorId> {
        match self {
            Operation::Allocate(_) => vec![],
            Operation::ToDevice(op) => vec![op.input],
            Operation::FromDevice(op) => vec![op.input],
            Operation::Deallocate(op) => vec![op.input],
            Operation::Compute(op) => op.inputs.clone(),
        }
    }

    // Identifiers this operation introduces
    pub fn output_ids(&self) -> Vec<TensorId> {
        match self {
            Operation::Allocate(op) => vec![op.output],
            Operation::ToDevice(ToDeviceOp { output, .. })
            | Operation::FromDevice(FromDeviceOp { output, .. }) => match output {
                OutputTarget::InPlace => vec![],
                OutputTarget::New(id) => vec![*id],
            },
            Operation::Deallocate(_) => vec![],
            Operation::Compute(op) => vec![op.output],
        }
    }
}

impl Debug for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Operation::Allocate(op) => op.fmt(f),
            Operation::ToDevice(op) => op.fmt(f),
            Operation::FromDevice(op) => op.fmt(f),
            Operation::Deallocate(op) => op.fmt(f),
            Operation::Compute(op) => op.fmt(f),
        }
    }
}

pub fn dispatch<P: DeviceProvider>(
    op: &Operation,
    pool: &mut TensorPool<P::Handle>,
    provider: &mut P,
) -> Result<(), ExecutionError> {
    match op {
        Operation::Allocate(op) => op.run(pool, provider),
        Operation::ToDevice(op) => op.run(pool, provider),
        Operation::FromDevice(op) => op.run(pool, provider),
        Operation::Deallocate(op) => op.run(pool, provider),
        Operation::Compute(op) => op.run(pool, provider),
    }
}

pub fn allocate(output: TensorId, desc: TensorDesc, placement: Placement) -> Operation {
    Operation::Allocate(AllocateOp {
        output,
        desc,
        placement,
    })
}

pub fn to_device(input: TensorId, output: OutputTarget) -> Operation {
    Operation::ToDevice(ToDeviceOp { input, output })
}

pub fn from_device(input: TensorId, output: OutputTarget) -> Operation {
    Operation::FromDevice(FromDeviceOp { input, output })
}

pub fn deallocate(input: TensorId, force: bool) -> Operation {
    Operation::Deallocate(DeallocateOp { input, force })
}

pub fn compute(kernel: Kernel, inputs: Vec<TensorId>, output: TensorId) -> Operation {
    Operation::Compute(ComputeOp {
        kernel,
        inputs,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::host::{DeviceOp, HostDevice, HostDeviceConfig},
        tensor::{DataType, TensorState},
        utils::error::{ErrorKind, ProtocolError},
    };

    fn setup() -> (TensorPool<<HostDevice as DeviceProvider>::Handle>, HostDevice) {
        let dev = HostDevice::new(HostDeviceConfig::default().with_device_memory(1 << 20));
        (TensorPool::new(), dev)
    }

    fn desc() -> TensorDesc {
        TensorDesc::new(vec![2, 2], DataType::F32)
    }

    #[test]
    fn allocate_inserts_with_placement_state() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Device), &mut pool, &mut dev).unwrap();
        dispatch(&allocate(2, desc(), Placement::Host), &mut pool, &mut dev).unwrap();

        assert_eq!(
            pool.snapshot(),
            vec![(1, TensorState::DeviceResident), (2, TensorState::HostResident)]
        );
        assert_eq!(dev.outstanding_handles(), 2);
    }

    #[test]
    fn duplicate_allocation_never_reaches_device() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Device), &mut pool, &mut dev).unwrap();

        let err = dispatch(&allocate(1, desc(), Placement::Host), &mut pool, &mut dev).unwrap_err();
        assert_eq!(err, ExecutionError::Protocol(ProtocolError::DuplicateIdentifier(1)));
        assert_eq!(dev.outstanding_handles(), 1);
    }

    #[test]
    fn from_device_on_host_tensor_is_illegal() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Host), &mut pool, &mut dev).unwrap();

        let err = dispatch(&from_device(1, OutputTarget::InPlace), &mut pool, &mut dev).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::IllegalStateTransition {
                id: 1,
                from: TensorState::HostResident,
                to: TensorState::HostResident
            }
        );
        assert_eq!(pool.get(1).unwrap().state(), TensorState::HostResident);
    }

    #[test]
    fn transfer_to_new_identifier_consumes_input() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Host), &mut pool, &mut dev).unwrap();
        dispatch(&to_device(1, OutputTarget::New(5)), &mut pool, &mut dev).unwrap();

        assert_eq!(pool.snapshot(), vec![(5, TensorState::DeviceResident)]);
        let err = dispatch(&deallocate(1, false), &mut pool, &mut dev).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Protocol(ProtocolError::ConsumedIdentifier { id: 1, successor: 5 })
        );
    }

    #[test]
    fn transfer_to_taken_identifier_leaves_pool_untouched() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Host), &mut pool, &mut dev).unwrap();
        dispatch(&allocate(2, desc(), Placement::Host), &mut pool, &mut dev).unwrap();

        let err = dispatch(&to_device(1, OutputTarget::New(2)), &mut pool, &mut dev).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(pool.get(1).unwrap().state(), TensorState::HostResident);
        assert_eq!(dev.device_memory_in_use(), 0);
    }

    #[test]
    fn device_failure_keeps_entry_and_state() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Host), &mut pool, &mut dev).unwrap();
        dev.fail_next(DeviceOp::HostToDevice);

        let err = dispatch(&to_device(1, OutputTarget::InPlace), &mut pool, &mut dev).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
        assert_eq!(pool.get(1).unwrap().state(), TensorState::HostResident);
    }

    #[test]
    fn double_free_is_illegal_transition() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Device), &mut pool, &mut dev).unwrap();
        dispatch(&deallocate(1, false), &mut pool, &mut dev).unwrap();

        let err = dispatch(&deallocate(1, false), &mut pool, &mut dev).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::IllegalStateTransition {
                id: 1,
                from: TensorState::Freed,
                to: TensorState::Freed
            }
        );
        assert_eq!(dev.released(), &[1]);
    }

    #[test]
    fn compute_requires_device_inputs() {
        let (mut pool, mut dev) = setup();
        dispatch(&allocate(1, desc(), Placement::Device), &mut pool, &mut dev).unwrap();
        dispatch(&allocate(2, desc(), Placement::Host), &mut pool, &mut dev).unwrap();

        let err = dispatch(&compute(Kernel::Add, vec![1, 2], 3), &mut pool, &mut dev).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::ResidencyMismatch {
                id: 2,
                expected: TensorState::DeviceResident,
                actual: TensorState::HostResident
            }
        );

        dispatch(&to_device(2, OutputTarget::InPlace), &mut pool, &mut dev).unwrap();
        dispatch(&compute(Kernel::Add, vec![1, 2], 3), &mut pool, &mut dev).unwrap();
        assert_eq!(pool.get(3).unwrap().state(), TensorState::DeviceResident);
    }

    #[test]
    fn operation_ids_describe_data_flow() {
        let op = compute(Kernel::Multiply, vec![4, 5], 6);
        assert_eq!(op.input_ids(), vec![4, 5]);
        assert_eq!(op.output_ids(), vec![6]);
        assert!(to_device(1, OutputTarget::InPlace).output_ids().is_empty());
        assert_eq!(format!("{:?}", deallocate(3, true)), "Deallocate(src=3, force=true)");
    }
}
