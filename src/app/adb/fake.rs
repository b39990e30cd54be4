//! Scripted bridge used by unit tests in place of a real adb binary.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::app::adb::runner::{BridgeExecutor, CommandOutput};
use crate::app::error::AppError;

type Reply = Result<CommandOutput, AppError>;

#[derive(Default)]
pub struct ScriptedBridge {
    replies: Mutex<HashMap<Vec<String>, Reply>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, args: &[&str], output: CommandOutput) {
        self.set(args, Ok(output));
    }

    /// Makes the call fail before any process output exists, like a missing executable.
    pub fn fail(&self, args: &[&str], message: &str) {
        self.set(args, Err(AppError::execution(message, "")));
    }

    pub fn reject(&self, args: &[&str], error: AppError) {
        self.set(args, Err(error));
    }

    fn set(&self, args: &[&str], reply: Reply) {
        let key = args.iter().map(|value| value.to_string()).collect();
        self.replies.lock().expect("replies").insert(key, reply);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn calls_joined(&self) -> Vec<String> {
        self.calls().iter().map(|call| call.join(" ")).collect()
    }
}

impl BridgeExecutor for ScriptedBridge {
    fn invoke(&self, args: &[String], trace_id: &str) -> Result<CommandOutput, AppError> {
        self.calls.lock().expect("calls").push(args.to_vec());
        match self.replies.lock().expect("replies").get(args) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(err)) => Err(AppError::new(err.code.clone(), err.error.clone(), trace_id)),
            None => Ok(CommandOutput::failed(
                1,
                format!("unscripted call: {}", args.join(" ")),
            )),
        }
    }

    fn program(&self) -> &str {
        "adb"
    }
}
