//! Program executor.

mod config;
mod executor;
mod report;
mod verify;

pub use config::ExecutorConfig;
pub use executor::{Executor, execute};
pub use report::{Diagnostic, ExecutionReport, ExecutionStatus};
pub use verify::verify;
