use thiserror::Error;
use vulkanalia::vk;

use crate::tensor::{TensorId, TensorState};

/// Failures while parsing the binary program encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Program truncated at byte {offset}: needed {needed} more bytes")]
    Truncated {
        record: Option<usize>,
        offset: usize,
        needed: usize,
    },

    #[error("Invalid magic: expected TXPG, got {0:?}")]
    BadMagic([u8; 4]),

    #[error("Unsupported program format version {0}")]
    UnsupportedVersion(u16),

    #[error("Record {record}: unsupported operation tag {tag:#04x}")]
    UnsupportedOperation { record: usize, tag: u8 },

    #[error("Record {record}: unsupported kernel code {code}")]
    UnsupportedKernel { record: usize, code: u8 },

    #[error("Unsupported data type code {code}")]
    UnsupportedDataType { record: Option<usize>, code: u8 },

    #[error("Record {record}: unsupported placement code {code}")]
    UnsupportedPlacement { record: usize, code: u8 },

    #[error("Record {record}: {reason}")]
    Malformed { record: usize, reason: String },

    #[error("{0} trailing bytes after the last record")]
    TrailingBytes(usize),
}

impl DecodeError {
    /// Index of the record being decoded when the error occurred, if any.
    pub fn record(&self) -> Option<usize> {
        match self {
            DecodeError::Truncated { record, .. } => *record,
            DecodeError::UnsupportedDataType { record, .. } => *record,
            DecodeError::UnsupportedOperation { record, .. }
            | DecodeError::UnsupportedKernel { record, .. }
            | DecodeError::UnsupportedPlacement { record, .. }
            | DecodeError::Malformed { record, .. } => Some(*record),
            DecodeError::BadMagic(_)
            | DecodeError::UnsupportedVersion(_)
            | DecodeError::TrailingBytes(_) => None,
        }
    }

    pub(crate) fn in_record(self, index: usize) -> Self {
        match self {
            DecodeError::Truncated { offset, needed, .. } => DecodeError::Truncated {
                record: Some(index),
                offset,
                needed,
            },
            DecodeError::UnsupportedDataType { code, .. } => DecodeError::UnsupportedDataType {
                record: Some(index),
                code,
            },
            other => other,
        }
    }
}

/// A program that does not fit the binary layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Tensor descriptor has {0} dimensions, at most 255 can be encoded")]
    TooManyDims(usize),

    #[error("Record {record}: {count} operands, at most 255 can be encoded")]
    TooManyOperands { record: usize, count: usize },

    #[error("Program declares {0} bindings, at most 65535 can be encoded")]
    TooManyBindings(usize),

    #[error("Record {record}: transfer of {id} names itself as the new identifier")]
    SelfTransfer { record: usize, id: TensorId },
}

/// A well-encoded program that violates the identifier protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown tensor identifier {0}")]
    UnknownIdentifier(TensorId),

    #[error("Duplicate tensor identifier {0}")]
    DuplicateIdentifier(TensorId),

    #[error("Tensor identifier {id} was consumed by a transfer into {successor}")]
    ConsumedIdentifier { id: TensorId, successor: TensorId },

    #[error("Program input {0} was not supplied")]
    MissingInput(TensorId),

    #[error("Tensor {0} was supplied but is not a program input")]
    UnexpectedInput(TensorId),

    #[error("Program input {0} was supplied more than once")]
    DuplicateInput(TensorId),

    #[error("Program output {0} is not live at program end")]
    MissingOutput(TensorId),

    #[error("Kernel {kernel} takes {expected} inputs, got {actual}")]
    ArityMismatch {
        kernel: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Failures reported by a device provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Handle {0} still has pending provider references")]
    PendingReferences(u64),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Kernel error: {0}")]
    Kernel(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Vulkan error: {0}")]
    Vulkan(String),
}

// Convert vk::Result (Vulkan return codes) into DeviceError
impl From<vk::Result> for DeviceError {
    fn from(r: vk::Result) -> Self {
        DeviceError::Vulkan(format!("vk::Result: {:?}", r))
    }
}

impl From<vk::ErrorCode> for DeviceError {
    fn from(c: vk::ErrorCode) -> Self {
        DeviceError::Vulkan(format!("vk::ErrorCode: {:?}", c))
    }
}

/// Failures of the tensor pool contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Unknown tensor identifier {0}")]
    UnknownIdentifier(TensorId),

    #[error("Duplicate tensor identifier {0}")]
    DuplicateIdentifier(TensorId),

    #[error("Tensor identifier {id} was consumed by a transfer into {successor}")]
    ConsumedIdentifier { id: TensorId, successor: TensorId },

    #[error("Tensor {id}: illegal state transition {from} -> {to}")]
    IllegalStateTransition {
        id: TensorId,
        from: TensorState,
        to: TensorState,
    },

    #[error("Tensor {0} used after being freed")]
    UseAfterFree(TensorId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Protocol,
    IllegalStateTransition,
    Device,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Tensor {id}: illegal state transition {from} -> {to}")]
    IllegalStateTransition {
        id: TensorId,
        from: TensorState,
        to: TensorState,
    },

    #[error("Tensor {0} used after being freed")]
    UseAfterFree(TensorId),

    #[error("Tensor {id}: expected {expected}, found {actual}")]
    ResidencyMismatch {
        id: TensorId,
        expected: TensorState,
        actual: TensorState,
    },

    #[error("Device error during {operation}: {source}")]
    Device {
        operation: &'static str,
        source: DeviceError,
    },
}

impl ExecutionError {
    pub fn device(operation: &'static str, source: DeviceError) -> Self {
        ExecutionError::Device { operation, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Decode(_) | ExecutionError::Protocol(_) => ErrorKind::Protocol,
            ExecutionError::IllegalStateTransition { .. }
            | ExecutionError::UseAfterFree(_)
            | ExecutionError::ResidencyMismatch { .. } => ErrorKind::IllegalStateTransition,
            ExecutionError::Device { .. } => ErrorKind::Device,
        }
    }
}

impl From<PoolError> for ExecutionError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::UnknownIdentifier(id) => ProtocolError::UnknownIdentifier(id).into(),
            PoolError::DuplicateIdentifier(id) => ProtocolError::DuplicateIdentifier(id).into(),
            PoolError::ConsumedIdentifier { id, successor } => {
                ProtocolError::ConsumedIdentifier { id, successor }.into()
            }
            PoolError::IllegalStateTransition { id, from, to } => {
                ExecutionError::IllegalStateTransition { id, from, to }
            }
            PoolError::UseAfterFree(id) => ExecutionError::UseAfterFree(id),
        }
    }
}
