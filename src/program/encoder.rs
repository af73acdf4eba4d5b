use crate::{
    instruction::{Operation, OutputTarget},
    program::{
        Program,
        format::{
            MAGIC, TAG_ALLOCATE, TAG_COMPUTE, TAG_DEALLOCATE, TAG_FROM_DEVICE, TAG_TO_DEVICE,
            VERSION, desc_len, write_desc,
        },
    },
    tensor::TensorId,
    utils::{ByteWriter, error::EncodeError},
};

pub fn encode(program: &Program) -> Result<Vec<u8>, EncodeError> {
    let input_count = u16::try_from(program.inputs.len())
        .map_err(|_| EncodeError::TooManyBindings(program.inputs.len()))?;
    let output_count = u16::try_from(program.outputs.len())
        .map_err(|_| EncodeError::TooManyBindings(program.outputs.len()))?;

    let mut w = ByteWriter::new();
    w.bytes(MAGIC);
    w.u16(VERSION);
    w.u16(0);
    w.u32(program.records.len() as u32);
    w.u16(input_count);
    w.u16(output_count);

    for input in &program.inputs {
        w.u32(input.id);
        write_desc(&mut w, &input.desc)?;
    }
    for &id in &program.outputs {
        w.u32(id);
    }
    for (index, op) in program.records.iter().enumerate() {
        encode_record(&mut w, index, op)?;
    }

    Ok(w.into_inner())
}

fn operand_count(record: usize, ids: &[TensorId]) -> Result<u8, EncodeError> {
    u8::try_from(ids.len()).map_err(|_| EncodeError::TooManyOperands {
        record,
        count: ids.len(),
    })
}

fn encode_record(w: &mut ByteWriter, index: usize, op: &Operation) -> Result<(), EncodeError> {
    let mut params = ByteWriter::new();
    let (tag, ins, outs) = match op {
        Operation::Allocate(a) => {
            params.u8(a.placement.code());
            write_desc(&mut params, &a.desc)?;
            debug_assert_eq!(params.len(), 1 + desc_len(&a.desc));
            (TAG_ALLOCATE, vec![], vec![a.output])
        }
        Operation::ToDevice(t) => (
            TAG_TO_DEVICE,
            vec![t.input],
            target_ids(index, t.input, t.output)?,
        ),
        Operation::FromDevice(t) => (
            TAG_FROM_DEVICE,
            vec![t.input],
            target_ids(index, t.input, t.output)?,
        ),
        Operation::Deallocate(d) => {
            params.u8(d.force as u8);
            (TAG_DEALLOCATE, vec![d.input], vec![])
        }
        Operation::Compute(c) => {
            params.u8(c.kernel.code());
            (TAG_COMPUTE, c.inputs.clone(), vec![c.output])
        }
    };
    let params = params.into_inner();

    w.u8(tag);
    w.u8(operand_count(index, &ins)?);
    w.u8(operand_count(index, &outs)?);
    w.u8(0);
    w.u16(params.len() as u16);
    for &id in ins.iter().chain(&outs) {
        w.u32(id);
    }
    w.bytes(&params);
    Ok(())
}

// An output equal to the input reads back as in place, so it has no encoding.
fn target_ids(
    record: usize,
    input: TensorId,
    target: OutputTarget,
) -> Result<Vec<TensorId>, EncodeError> {
    match target {
        OutputTarget::InPlace => Ok(vec![]),
        OutputTarget::New(id) if id == input => Err(EncodeError::SelfTransfer { record, id }),
        OutputTarget::New(id) => Ok(vec![id]),
    }
}
