//! Core run status and result types.

mod result;
mod status;

pub use result::{CommandRecord, RunResult};
pub use status::RunStatus;
