use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{
    tensor::{TensorId, TensorState},
    utils::error::{DeviceError, ExecutionError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Completed,
    /// `record` is `None` when the failure is not tied to one record:
    /// header decoding, input binding, or missing outputs.
    Failed {
        record: Option<usize>,
        error: ExecutionError,
    },
}

/// A release that failed while reclaiming resources. These never change the
/// run's status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub id: TensorId,
    pub error: DeviceError,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "tensor {}: release failed: {}", self.id, self.error)
    }
}

#[derive(Debug)]
pub struct ExecutionReport<H> {
    pub status: ExecutionStatus,
    pub records_executed: usize,
    /// Pool contents when execution stopped, before teardown, oldest first.
    pub surviving: Vec<(TensorId, TensorState)>,
    /// Declared outputs moved out of the pool on success.
    pub outputs: Vec<(TensorId, H)>,
    /// Handles successfully released during teardown.
    pub released: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl<H> ExecutionReport<H> {
    pub(crate) fn new() -> Self {
        Self {
            status: ExecutionStatus::Completed,
            records_executed: 0,
            surviving: Vec::new(),
            outputs: Vec::new(),
            released: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, record: Option<usize>, error: ExecutionError) {
        self.status = ExecutionStatus::Failed { record, error };
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn failed_record(&self) -> Option<usize> {
        match &self.status {
            ExecutionStatus::Failed { record, .. } => *record,
            ExecutionStatus::Completed => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match &self.status {
            ExecutionStatus::Failed { error, .. } => Some(error),
            ExecutionStatus::Completed => None,
        }
    }

    pub fn surviving_ids(&self) -> Vec<TensorId> {
        self.surviving.iter().map(|(id, _)| *id).collect()
    }

    pub fn surviving_state(&self, id: TensorId) -> Option<TensorState> {
        self.surviving
            .iter()
            .find(|(s, _)| *s == id)
            .map(|(_, state)| *state)
    }

    pub fn output(&self, id: TensorId) -> Option<&H> {
        self.outputs.iter().find(|(o, _)| *o == id).map(|(_, h)| h)
    }

    pub fn take_outputs(&mut self) -> Vec<(TensorId, H)> {
        std::mem::take(&mut self.outputs)
    }
}

impl<H> Display for ExecutionReport<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.status {
            ExecutionStatus::Completed => writeln!(f, "Completed")?,
            ExecutionStatus::Failed {
                record: Some(record),
                error,
            } => writeln!(f, "Failed at record {}: {}", record, error)?,
            ExecutionStatus::Failed {
                record: None,
                error,
            } => writeln!(f, "Failed: {}", error)?,
        }
        writeln!(f, "Records executed: {}", self.records_executed)?;
        writeln!(f, "Surviving tensors: {}", self.surviving.len())?;
        for (id, state) in &self.surviving {
            writeln!(f, "  {}: {}", id, state)?;
        }
        writeln!(f, "Outputs returned: {}", self.outputs.len())?;
        write!(f, "Released on teardown: {}", self.released)?;
        for d in &self.diagnostics {
            write!(f, "\n  {}", d)?;
        }
        Ok(())
    }
}
