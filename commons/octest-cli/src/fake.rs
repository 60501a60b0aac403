//! Scripted stand-in for the cluster CLI.
//!
//! The handler sees every [`Invocation`] and decides what the "cluster"
//! answers, which lets tests model state that changes between calls.

use std::sync::{Mutex, PoisonError};

use crate::error::CliError;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

type Handler = Box<dyn FnMut(&Invocation) -> CommandOutput + Send>;

pub struct FakeRunner {
    handler: Mutex<Handler>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new(
        handler: impl FnMut(&Invocation) -> CommandOutput + Send + 'static,
    ) -> Self {
        Self {
            handler: Mutex::new(Box::new(handler)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A runner on which every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| CommandOutput::ok(""))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count_verb(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|inv| inv.verb() == Some(verb))
            .count()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CliError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());
        let mut handler =
            self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((*handler)(invocation))
    }
}
