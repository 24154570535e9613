#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod attribution;
pub mod cache;
pub mod connectivity;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod permission;
pub mod resolver;
pub mod session;
pub mod store;

pub use error::{BootstrapError, Result};
pub use orchestrator::{BootstrapOutcome, Orchestrator, OrchestratorHandle};
pub use resolver::Resolution;
