//! ResumeProgram (§4.3): the scheduler-invoked handler that turns a
//! power-up event for a hostlist of nodes into launched, bound, DNS-visible
//! instances.

pub mod cooldown;
pub mod error;
pub mod pipeline;

pub use cooldown::CooldownCache;
pub use error::{ResumeError, Result};
pub use pipeline::{run, NodeOutcome, NodeResult, ResumeContext, ResumeReport};
