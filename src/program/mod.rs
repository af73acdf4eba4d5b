//! Decoded programs and their binary encoding.

mod builder;
mod decoder;
mod encoder;
pub mod format;

pub use builder::ProgramBuilder;
pub use decoder::decode;
pub use encoder::encode;

use crate::{
    instruction::Operation,
    tensor::{TensorDesc, TensorId},
    utils::error::{DecodeError, EncodeError},
};

/// A caller-supplied tensor bound to `id` before the first record runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramInput {
    pub id: TensorId,
    pub desc: TensorDesc,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub inputs: Vec<ProgramInput>,
    /// Identifiers handed back to the caller after a successful run.
    pub outputs: Vec<TensorId>,
    pub records: Vec<Operation>,
}

impl Program {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        decode(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self)
    }

    pub fn input(&self, id: TensorId) -> Option<&ProgramInput> {
        self.inputs.iter().find(|i| i.id == id)
    }
}
