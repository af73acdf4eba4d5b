use tracing::debug;

use crate::{
    device::Placement,
    instruction::{self, Operation, OutputTarget},
    kernel::Kernel,
    program::{
        Program, ProgramInput,
        format::{
            HEADER_SIZE, MAGIC, RECORD_HEADER_SIZE, TAG_ALLOCATE, TAG_COMPUTE, TAG_DEALLOCATE,
            TAG_FROM_DEVICE, TAG_TO_DEVICE, VERSION, read_desc,
        },
    },
    tensor::TensorId,
    utils::{ByteReader, error::DecodeError},
};

pub fn decode(bytes: &[u8]) -> Result<Program, DecodeError> {
    let mut r = ByteReader::new(bytes);

    let magic = r.array::<4>()?;
    if &magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = r.u16()?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let _flags = r.u16()?;
    let record_count = r.u32()? as usize;
    let input_count = r.u16()? as usize;
    let output_count = r.u16()? as usize;
    debug_assert_eq!(r.offset(), HEADER_SIZE);

    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        let id = r.u32()?;
        let desc = read_desc(&mut r)?;
        inputs.push(ProgramInput { id, desc });
    }

    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        outputs.push(r.u32()?);
    }

    // record_count is untrusted, cap the reservation by what the buffer can hold
    let mut records = Vec::with_capacity(record_count.min(r.remaining() / RECORD_HEADER_SIZE));
    for index in 0..record_count {
        let op = decode_record(&mut r, index).map_err(|e| e.in_record(index))?;
        records.push(op);
    }

    if r.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    debug!(
        "Decoded program: {} records, {} inputs, {} outputs",
        records.len(),
        inputs.len(),
        outputs.len()
    );

    Ok(Program {
        inputs,
        outputs,
        records,
    })
}

fn malformed(record: usize, reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        record,
        reason: reason.into(),
    }
}

fn expect_operands(
    record: usize,
    name: &str,
    kind: &str,
    actual: usize,
    allowed: &[usize],
) -> Result<(), DecodeError> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(malformed(
            record,
            format!("{} takes {:?} {}, got {}", name, allowed, kind, actual),
        ))
    }
}

fn read_ids(r: &mut ByteReader<'_>, count: usize) -> Result<Vec<TensorId>, DecodeError> {
    (0..count).map(|_| r.u32()).collect()
}

fn decode_record(r: &mut ByteReader<'_>, index: usize) -> Result<Operation, DecodeError> {
    let tag = r.u8()?;
    let n_in = r.u8()? as usize;
    let n_out = r.u8()? as usize;
    let _reserved = r.u8()?;
    let param_len = r.u16()? as usize;

    let name = match tag {
        TAG_ALLOCATE => "allocate",
        TAG_TO_DEVICE => "to_device",
        TAG_FROM_DEVICE => "from_device",
        TAG_DEALLOCATE => "deallocate",
        TAG_COMPUTE => "compute",
        _ => return Err(DecodeError::UnsupportedOperation { record: index, tag }),
    };

    let ins = read_ids(r, n_in)?;
    let outs = read_ids(r, n_out)?;
    let params = r.take(param_len)?;

    // Parameters are read from their own window: running past it is a
    // malformed record, bytes left over belong to a newer revision and are skipped.
    let mut p = ByteReader::new(params);
    let short = |e: DecodeError| match e {
        DecodeError::Truncated { .. } => malformed(index, format!("{} parameters too short", name)),
        other => other,
    };

    let op = match tag {
        TAG_ALLOCATE => {
            expect_operands(index, name, "inputs", n_in, &[0])?;
            expect_operands(index, name, "outputs", n_out, &[1])?;
            let code = p.u8().map_err(short)?;
            let placement = Placement::from_code(code)
                .ok_or(DecodeError::UnsupportedPlacement { record: index, code })?;
            let desc = read_desc(&mut p).map_err(short)?;
            if desc.size_in_bytes().is_none() {
                return Err(malformed(index, format!("{} is too large to address", desc)));
            }
            instruction::allocate(outs[0], desc, placement)
        }
        TAG_TO_DEVICE | TAG_FROM_DEVICE => {
            expect_operands(index, name, "inputs", n_in, &[1])?;
            expect_operands(index, name, "outputs", n_out, &[0, 1])?;
            let input = ins[0];
            let output = match outs.first() {
                Some(&out) if out != input => OutputTarget::New(out),
                _ => OutputTarget::InPlace,
            };
            if tag == TAG_TO_DEVICE {
                instruction::to_device(input, output)
            } else {
                instruction::from_device(input, output)
            }
        }
        TAG_DEALLOCATE => {
            expect_operands(index, name, "inputs", n_in, &[1])?;
            expect_operands(index, name, "outputs", n_out, &[0])?;
            let force = match p.u8().map_err(short)? {
                0 => false,
                1 => true,
                other => return Err(malformed(index, format!("force flag {}", other))),
            };
            instruction::deallocate(ins[0], force)
        }
        TAG_COMPUTE => {
            expect_operands(index, name, "outputs", n_out, &[1])?;
            if n_in == 0 {
                return Err(malformed(index, "compute takes at least one input"));
            }
            let code = p.u8().map_err(short)?;
            let kernel =
                Kernel::from_code(code).ok_or(DecodeError::UnsupportedKernel { record: index, code })?;
            instruction::compute(kernel, ins, outs[0])
        }
        _ => return Err(DecodeError::UnsupportedOperation { record: index, tag }),
    };

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        program::ProgramBuilder,
        tensor::{DataType, TensorDesc},
        utils::ByteWriter,
    };

    fn header(w: &mut ByteWriter, records: u32) {
        w.bytes(MAGIC);
        w.u16(VERSION);
        w.u16(0);
        w.u32(records);
        w.u16(0);
        w.u16(0);
    }

    fn record(w: &mut ByteWriter, tag: u8, ins: &[u32], outs: &[u32], params: &[u8]) {
        w.u8(tag);
        w.u8(ins.len() as u8);
        w.u8(outs.len() as u8);
        w.u8(0);
        w.u16(params.len() as u16);
        for &id in ins.iter().chain(outs) {
            w.u32(id);
        }
        w.bytes(params);
    }

    #[test]
    fn empty_program() {
        let mut w = ByteWriter::new();
        header(&mut w, 0);
        let program = decode(&w.into_inner()).unwrap();
        assert!(program.records.is_empty());
        assert!(program.inputs.is_empty());
    }

    #[test]
    fn unknown_tag_is_unsupported_operation() {
        let mut w = ByteWriter::new();
        header(&mut w, 2);
        record(&mut w, TAG_DEALLOCATE, &[1], &[], &[0]);
        record(&mut w, 0x7f, &[], &[], &[]);
        let err = decode(&w.into_inner()).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedOperation { record: 1, tag: 0x7f });
        assert_eq!(err.record(), Some(1));
    }

    #[test]
    fn bad_magic_and_version() {
        let mut bytes = ProgramBuilder::new().build().encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(DecodeError::BadMagic(_))));

        let mut bytes = ProgramBuilder::new().build().encode().unwrap();
        bytes[4] = 9;
        assert_eq!(decode(&bytes), Err(DecodeError::UnsupportedVersion(9)));
    }

    #[test]
    fn truncated_record_reports_its_index() {
        let mut w = ByteWriter::new();
        header(&mut w, 1);
        w.u8(TAG_DEALLOCATE);
        w.u8(1);
        let err = decode(&w.into_inner()).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { record: Some(0), .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut w = ByteWriter::new();
        header(&mut w, 0);
        w.u8(0xaa);
        assert_eq!(decode(&w.into_inner()), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn extra_params_are_skipped_short_params_are_malformed() {
        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_DEALLOCATE, &[3], &[], &[1, 0xde, 0xad]);
        let program = decode(&w.into_inner()).unwrap();
        assert_eq!(program.records, vec![instruction::deallocate(3, true)]);

        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_DEALLOCATE, &[3], &[], &[]);
        assert!(matches!(
            decode(&w.into_inner()),
            Err(DecodeError::Malformed { record: 0, .. })
        ));
    }

    #[test]
    fn transfer_output_equal_to_input_is_in_place() {
        let mut w = ByteWriter::new();
        header(&mut w, 2);
        record(&mut w, TAG_TO_DEVICE, &[4], &[4], &[]);
        record(&mut w, TAG_FROM_DEVICE, &[4], &[9], &[]);
        let program = decode(&w.into_inner()).unwrap();
        assert_eq!(
            program.records,
            vec![
                instruction::to_device(4, OutputTarget::InPlace),
                instruction::from_device(4, OutputTarget::New(9)),
            ]
        );
    }

    #[test]
    fn operand_counts_are_checked() {
        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_TO_DEVICE, &[1, 2], &[], &[]);
        assert!(matches!(
            decode(&w.into_inner()),
            Err(DecodeError::Malformed { record: 0, .. })
        ));
    }

    #[test]
    fn unknown_codes_in_params() {
        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_COMPUTE, &[1], &[2], &[42]);
        assert_eq!(
            decode(&w.into_inner()),
            Err(DecodeError::UnsupportedKernel { record: 0, code: 42 })
        );

        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_ALLOCATE, &[], &[1], &[0, 99, 0]);
        assert_eq!(
            decode(&w.into_inner()),
            Err(DecodeError::UnsupportedDataType { record: Some(0), code: 99 })
        );
    }

    #[test]
    fn unaddressable_allocation_is_malformed() {
        let mut params = ByteWriter::new();
        params.u8(Placement::Device.code());
        params.u8(DataType::F32.code());
        params.u8(3);
        for _ in 0..3 {
            params.u32(u32::MAX);
        }

        let mut w = ByteWriter::new();
        header(&mut w, 1);
        record(&mut w, TAG_ALLOCATE, &[], &[1], &params.into_inner());
        assert!(matches!(
            decode(&w.into_inner()),
            Err(DecodeError::Malformed { record: 0, .. })
        ));
    }

    #[test]
    fn builder_output_decodes_to_same_program() {
        let desc = TensorDesc::new(vec![2, 3], DataType::F32);
        let program = ProgramBuilder::new()
            .input(7, desc.clone())
            .allocate(1, desc, Placement::Device)
            .to_device(7, OutputTarget::InPlace)
            .compute(Kernel::Add, &[1, 7], 2)
            .from_device(2, OutputTarget::New(3))
            .deallocate(1, false)
            .output(3)
            .build();

        let bytes = program.encode().unwrap();
        assert_eq!(decode(&bytes).unwrap(), program);
    }
}
