use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::{
    device::DeviceProvider,
    execution::{
        config::ExecutorConfig,
        report::{Diagnostic, ExecutionReport, ExecutionStatus},
        verify::verify,
    },
    instruction::dispatch,
    program::Program,
    tensor::{TensorId, TensorPool, TensorState},
    utils::error::{ExecutionError, ProtocolError},
};

/// Runs programs against one device provider.
///
/// Each run owns a fresh [`TensorPool`]. Records execute strictly in order
/// and the first failure halts the run. Whatever the outcome, every pool
/// entry still live at the end is released through the provider before the
/// report is returned, except declared outputs of a successful run, which
/// move into the report.
pub struct Executor<P: DeviceProvider> {
    provider: P,
    config: ExecutorConfig,
}

impl<P: DeviceProvider> Executor<P> {
    pub fn new(provider: P, config: ExecutorConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    pub fn execute(&mut self, bytes: &[u8]) -> ExecutionReport<P::Handle> {
        self.execute_with_inputs(bytes, Vec::new())
    }

    /// Decodes `bytes` and runs the program with `inputs` bound to the
    /// program's declared input identifiers. Supplied handles are owned by
    /// the run from here on: they are released even if decoding fails.
    pub fn execute_with_inputs(
        &mut self,
        bytes: &[u8],
        inputs: Vec<(TensorId, P::Handle)>,
    ) -> ExecutionReport<P::Handle> {
        match Program::decode(bytes) {
            Ok(program) => self.run_program(&program, inputs),
            Err(e) => {
                let record = e.record();
                warn!("Program rejected by decoder: {}", e);
                let mut report = ExecutionReport::new();
                report.fail(record, e.into());
                self.release_all(inputs, &mut report);
                report
            }
        }
    }

    pub fn run_program(
        &mut self,
        program: &Program,
        inputs: Vec<(TensorId, P::Handle)>,
    ) -> ExecutionReport<P::Handle> {
        info!(
            "Executing program on {}: {} records, {} inputs, {} outputs",
            self.provider.name(),
            program.records.len(),
            program.inputs.len(),
            program.outputs.len()
        );
        let mut report = ExecutionReport::new();

        if self.config.verify_before_execute {
            if let Err((record, error)) = verify(program) {
                warn!("Program failed verification: {}", error);
                report.fail(record, error);
                self.release_all(inputs, &mut report);
                return report;
            }
        }

        if let Err(error) = check_bindings(program, &inputs) {
            warn!("Input binding failed: {}", error);
            report.fail(None, error);
            self.release_all(inputs, &mut report);
            return report;
        }

        let mut pool = TensorPool::new();
        for (id, handle) in inputs {
            // identifiers were checked unique against a fresh pool
            if let Err(e) = pool.insert(id, handle, TensorState::HostResident) {
                report.fail(None, e.into());
                break;
            }
        }

        if report.is_success() {
            for (index, op) in program.records.iter().enumerate() {
                debug!("[{}] {:?}", index, op);
                if let Err(error) = dispatch(op, &mut pool, &mut self.provider) {
                    warn!("Record {} ({}) failed: {}", index, op.name(), error);
                    report.fail(Some(index), error);
                    break;
                }
                report.records_executed += 1;
            }
        }

        report.surviving = pool.snapshot();

        if report.is_success() {
            if let Some(&missing) = program.outputs.iter().find(|&&id| !pool.contains(id)) {
                report.fail(None, ProtocolError::MissingOutput(missing).into());
            } else if self.config.retain_outputs {
                for &id in &program.outputs {
                    // listed twice: already moved
                    if let Ok(handle) = pool.remove(id) {
                        report.outputs.push((id, handle));
                    }
                }
            }
        }

        self.release_all(pool.drain(), &mut report);

        match &report.status {
            ExecutionStatus::Completed => info!(
                "Program completed: {} records, {} outputs, {} released",
                report.records_executed,
                report.outputs.len(),
                report.released
            ),
            ExecutionStatus::Failed { record, error } => info!(
                "Program failed at record {:?}: {} ({} released)",
                record, error, report.released
            ),
        }

        report
    }

    fn release_all(
        &mut self,
        handles: Vec<(TensorId, P::Handle)>,
        report: &mut ExecutionReport<P::Handle>,
    ) {
        let force = self.config.force_release_on_teardown;
        for (id, handle) in handles {
            match self.provider.release(handle, force) {
                Ok(()) => report.released += 1,
                Err(error) => {
                    warn!("Failed to release tensor {} on teardown: {}", id, error);
                    report.diagnostics.push(Diagnostic { id, error });
                }
            }
        }
    }
}

fn check_bindings<H>(program: &Program, inputs: &[(TensorId, H)]) -> Result<(), ExecutionError> {
    let mut supplied = HashSet::new();
    for (id, _) in inputs {
        if program.input(*id).is_none() {
            return Err(ProtocolError::UnexpectedInput(*id).into());
        }
        if !supplied.insert(*id) {
            return Err(ProtocolError::DuplicateInput(*id).into());
        }
    }
    if let Some(missing) = program.inputs.iter().find(|i| !supplied.contains(&i.id)) {
        return Err(ProtocolError::MissingInput(missing.id).into());
    }
    Ok(())
}

/// Runs `bytes` once against `provider` with the default configuration.
pub fn execute<P: DeviceProvider>(bytes: &[u8], provider: &mut P) -> ExecutionReport<P::Handle> {
    Executor::new(provider, ExecutorConfig::default()).execute(bytes)
}
