//! Thin wrapper over a kubectl-compatible CLI (`oc` by default).
//!
//! Scenarios build commands the same way they would type them:
//!
//! ```ignore
//! let phase = cli
//!     .as_admin()
//!     .without_namespace()
//!     .run("get")
//!     .args(["pod", "web", "-n", "demo", "-o=jsonpath={.status.phase}"])
//!     .output()?;
//! ```
//!
//! Execution goes through a [`CommandRunner`]: [`DuctRunner`] spawns real
//! processes, [`FakeRunner`] answers from a closure in tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod fake;
pub mod runner;

pub use cli::{Cli, CommandBuilder, Identity};
pub use config::CliConfig;
pub use error::{CliError, looks_not_found};
pub use fake::FakeRunner;
pub use runner::{CommandOutput, CommandRunner, DuctRunner, Invocation};
