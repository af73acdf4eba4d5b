//! Compute kernels a program can invoke through the device provider.
//!
//! The executor only routes a [`Kernel`] tag; the host implementations here
//! back the reference provider and the Vulkan provider's host fallback.

mod f32_cpu;

use crate::{
    tensor::{DataType, TensorDesc},
    utils::error::DeviceError,
};

use f32_cpu::{binary_f32_cpu, unary_f32_cpu};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    Add,
    Multiply,
    Relu,
    Copy,
}

impl Kernel {
    pub fn code(self) -> u8 {
        match self {
            Kernel::Add => 0,
            Kernel::Multiply => 1,
            Kernel::Relu => 2,
            Kernel::Copy => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Kernel::Add),
            1 => Some(Kernel::Multiply),
            2 => Some(Kernel::Relu),
            3 => Some(Kernel::Copy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kernel::Add => "add",
            Kernel::Multiply => "multiply",
            Kernel::Relu => "relu",
            Kernel::Copy => "copy",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Kernel::Add | Kernel::Multiply => 2,
            Kernel::Relu | Kernel::Copy => 1,
        }
    }

    /// Validates operand descriptors and returns the descriptor of the result.
    pub fn output_desc(self, inputs: &[&TensorDesc]) -> Result<TensorDesc, DeviceError> {
        if inputs.len() != self.arity() {
            return Err(DeviceError::Kernel(format!(
                "{:?} takes {} inputs, got {}",
                self,
                self.arity(),
                inputs.len()
            )));
        }

        let first = inputs[0];
        if let Some(other) = inputs.iter().find(|d| **d != first) {
            return Err(DeviceError::Kernel(format!(
                "{:?} operands differ: {} vs {}",
                self, first, other
            )));
        }

        if self != Kernel::Copy && first.data_type() != DataType::F32 {
            return Err(DeviceError::Unsupported(format!(
                "{:?} on {:?}",
                self,
                first.data_type()
            )));
        }

        Ok(first.clone())
    }

    /// Runs the kernel on host memory. `inputs` must already satisfy
    /// [`Kernel::output_desc`], so the result has the first input's length.
    pub fn run_host(self, inputs: &[&[u8]]) -> Vec<u8> {
        let mut dst = vec![0u8; inputs[0].len()];
        match self {
            Kernel::Add => binary_f32_cpu(inputs[0], inputs[1], &mut dst, |a, b| a + b),
            Kernel::Multiply => binary_f32_cpu(inputs[0], inputs[1], &mut dst, |a, b| a * b),
            Kernel::Relu => unary_f32_cpu(inputs[0], &mut dst, |x| x.max(0.0)),
            Kernel::Copy => dst.copy_from_slice(inputs[0]),
        }
        dst
    }
}
