#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Replay the program against a shadow pool before touching the device.
    pub verify_before_execute: bool,
    /// Force flag passed to the provider when reclaiming surviving entries.
    pub force_release_on_teardown: bool,
    /// Hand declared program outputs to the caller instead of releasing them.
    pub retain_outputs: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            verify_before_execute: false,
            force_release_on_teardown: true,
            retain_outputs: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_verify_before_execute(mut self, verify: bool) -> Self {
        self.verify_before_execute = verify;
        self
    }

    pub fn with_force_release_on_teardown(mut self, force: bool) -> Self {
        self.force_release_on_teardown = force;
        self
    }

    pub fn with_retain_outputs(mut self, retain: bool) -> Self {
        self.retain_outputs = retain;
        self
    }
}
