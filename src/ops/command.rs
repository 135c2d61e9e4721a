//! Timed local CLI invocations.

use crate::runner::{Operation, OperationError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Run `program args...` to completion; success means exit status 0.
#[derive(Debug, Clone)]
pub struct CommandOperation {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandOperation {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Operation for CommandOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self) -> Result<(), OperationError> {
        // kill_on_drop: the runner's timeout drops this future mid-wait.
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| OperationError::Spawn {
                message: format!("{}: {e}", self.program),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(OperationError::Exit {
                status: status.to_string(),
            })
        }
    }
}
