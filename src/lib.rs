//! tensorexec - executor for compiled, low-level tensor programs
//!
//! A program is an ordered stream of records that allocate, move, compute
//! and free tensors on a device. The executor walks that stream once, keeps
//! every tensor's lifecycle in a pool it alone owns, and reaches the device
//! only through a [`DeviceProvider`].

pub mod device;

pub mod execution;

pub mod instruction;

pub mod kernel;

pub mod program;

pub mod tensor;

pub mod utils;

pub use device::{
    AllocationSpec, DeviceProvider, Placement,
    host::{DeviceOp, HostDevice, HostDeviceConfig, HostTensor},
    vulkan::{VulkanDevice, VulkanTensor},
};
pub use execution::{
    Diagnostic, ExecutionReport, ExecutionStatus, Executor, ExecutorConfig, execute, verify,
};
pub use instruction::{Operation, OutputTarget, dispatch};
pub use kernel::Kernel;
pub use program::{Program, ProgramBuilder, ProgramInput};
pub use tensor::{DataType, TensorDesc, TensorId, TensorPool, TensorState};
pub use utils::error::{
    DecodeError, DeviceError, EncodeError, ErrorKind, ExecutionError, PoolError, ProtocolError,
};
