use std::collections::HashSet;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tensorexec::{
    DataType, Executor, ExecutorConfig, HostDevice, HostDeviceConfig, Kernel, Operation,
    OutputTarget, Placement, Program, ProgramBuilder, TensorDesc, TensorId, verify,
};

const IDS: u32 = 6;

fn random_program(rng: &mut StdRng, len: usize) -> Program {
    let desc = TensorDesc::new(vec![3], DataType::F32);
    let mut builder = ProgramBuilder::new();
    for _ in 0..len {
        let id = rng.random_range(0..IDS);
        let target = match rng.random_range(0..IDS) {
            out if out != id && rng.random_bool(0.5) => OutputTarget::New(out),
            _ => OutputTarget::InPlace,
        };
        builder = match rng.random_range(0..5) {
            0 => {
                let placement = if rng.random_bool(0.5) {
                    Placement::Host
                } else {
                    Placement::Device
                };
                builder.allocate(id, desc.clone(), placement)
            }
            1 => builder.to_device(id, target),
            2 => builder.from_device(id, target),
            3 => builder.deallocate(id, rng.random_bool(0.5)),
            _ => {
                let other = rng.random_range(0..IDS);
                builder.compute(Kernel::Add, &[id, other], rng.random_range(0..IDS))
            }
        };
    }
    builder.build()
}

/// Identifiers a fully successful run leaves live, in introduction order.
fn expected_survivors(program: &Program) -> Vec<TensorId> {
    let mut live: Vec<TensorId> = program.inputs.iter().map(|i| i.id).collect();
    let transfer = |live: &mut Vec<TensorId>, input: TensorId, output: OutputTarget| {
        if let OutputTarget::New(out) = output {
            live.retain(|&id| id != input);
            live.push(out);
        }
    };
    for op in &program.records {
        match op {
            Operation::Allocate(a) => live.push(a.output),
            Operation::ToDevice(t) => transfer(&mut live, t.input, t.output),
            Operation::FromDevice(t) => transfer(&mut live, t.input, t.output),
            Operation::Deallocate(d) => live.retain(|&id| id != d.input),
            Operation::Compute(c) => live.push(c.output),
        }
    }
    live
}

#[test]
fn runs_release_everything_and_agree_with_verifier() {
    let mut rng = StdRng::seed_from_u64(0x7e45);

    for _ in 0..500 {
        let len = rng.random_range(0..12);
        let program = random_program(&mut rng, len);
        let bytes = program.encode().unwrap();
        assert_eq!(Program::decode(&bytes).unwrap(), program);

        let dev = HostDevice::new(HostDeviceConfig::default().with_device_memory(1 << 20));
        let mut exec = Executor::new(dev, ExecutorConfig::default());
        let report = exec.execute(&bytes);

        // nothing outlives the run
        assert_eq!(exec.provider().outstanding_handles(), 0);
        assert_eq!(exec.provider().device_memory_in_use(), 0);
        assert_eq!(report.released, report.surviving.len());

        // surviving identifiers are distinct and every one was introduced by a record that ran
        let ids: HashSet<u32> = report.surviving_ids().into_iter().collect();
        assert_eq!(ids.len(), report.surviving.len());
        let introduced: HashSet<u32> = program.records[..report.records_executed]
            .iter()
            .flat_map(|op| op.output_ids())
            .collect();
        assert!(ids.is_subset(&introduced), "{:?}", program);
        if report.is_success() {
            assert_eq!(report.surviving_ids(), expected_survivors(&program), "{:?}", program);
        }

        // strict order: exactly the records before the failure ran
        match report.failed_record() {
            Some(index) => assert_eq!(report.records_executed, index),
            None => assert_eq!(report.records_executed, program.records.len()),
        }

        // the host device never fails on its own, so the static check predicts the outcome
        let predicted = verify(&program).err();
        let actual = report.error().map(|e| (report.failed_record(), e.clone()));
        assert_eq!(predicted, actual, "{:?}", program);
    }
}
