//! Operation Queue (component §4.F), grounded on
//! `examples/Lowband21-ferrex/ferrex-core/src/scan/orchestration` — the
//! teacher's job-scheduling subsystem, generalized from media-scan jobs to
//! the five operation kinds this domain names.

mod handlers;
mod queue;

pub use handlers::{HandlerRegistry, OperationContext, OperationHandler};
pub use queue::OperationQueue;
