pub mod orchestrator;
pub mod scratch;

pub use orchestrator::{SessionProcessor, SessionRunResult};
pub use scratch::Scratch;
