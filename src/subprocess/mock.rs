use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Test double for the subprocess layer.
///
/// Responses are scripted per program name and served in order; every
/// invocation is recorded so tests can assert which tools ran, with
/// which arguments and environment, and in which order. Running a
/// program with no scripted response is an error, which keeps tests
/// honest about exactly what they expect to be invoked.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    responses: Arc<Mutex<HashMap<String, VecDeque<ProcessOutput>>>>,
    history: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next response for `program`.
    pub fn script(&self, program: &str, output: ProcessOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    pub fn script_success(&self, program: &str) {
        self.script(program, ProcessOutput::with_status(ExitStatus::Success));
    }

    pub fn script_failure(&self, program: &str, code: i32, stderr: &str) {
        let mut output = ProcessOutput::with_status(ExitStatus::Error(code));
        output.stderr = stderr.to_string();
        self.script(program, output);
    }

    pub fn script_timeout(&self, program: &str) {
        self.script(program, ProcessOutput::with_status(ExitStatus::Timeout));
    }

    /// Every command run so far, in invocation order.
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.history.lock().unwrap().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<ProcessCommand> {
        self.calls()
            .into_iter()
            .filter(|command| command.program == program)
            .collect()
    }

    pub fn was_invoked(&self, program: &str) -> bool {
        !self.calls_to(program).is_empty()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.history.lock().unwrap().push(command.clone());

        let response = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&command.program)
            .and_then(VecDeque::pop_front);

        response.ok_or_else(|| ProcessError::Unscripted(command.display_line()))
    }
}
