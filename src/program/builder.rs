use crate::{
    device::Placement,
    instruction::{self, Operation, OutputTarget},
    kernel::Kernel,
    program::{Program, ProgramInput},
    tensor::{TensorDesc, TensorId},
};

/// Assembles a [`Program`] record by record.
///
/// No checks happen here: a builder can express any record sequence,
/// including ones the executor will reject.
#[derive(Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, id: TensorId, desc: TensorDesc) -> Self {
        self.program.inputs.push(ProgramInput { id, desc });
        self
    }

    pub fn output(mut self, id: TensorId) -> Self {
        self.program.outputs.push(id);
        self
    }

    pub fn op(mut self, op: Operation) -> Self {
        self.program.records.push(op);
        self
    }

    pub fn allocate(self, id: TensorId, desc: TensorDesc, placement: Placement) -> Self {
        self.op(instruction::allocate(id, desc, placement))
    }

    pub fn to_device(self, id: TensorId, output: OutputTarget) -> Self {
        self.op(instruction::to_device(id, output))
    }

    pub fn from_device(self, id: TensorId, output: OutputTarget) -> Self {
        self.op(instruction::from_device(id, output))
    }

    pub fn deallocate(self, id: TensorId, force: bool) -> Self {
        self.op(instruction::deallocate(id, force))
    }

    pub fn compute(self, kernel: Kernel, inputs: &[TensorId], output: TensorId) -> Self {
        self.op(instruction::compute(kernel, inputs.to_vec(), output))
    }

    pub fn build(self) -> Program {
        self.program
    }
}
