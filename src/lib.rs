pub mod aggregate;
pub mod analysis;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod store;
pub mod utils;
pub mod video;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{SessionProcessor, SessionRunResult};
pub use settings::Settings;
