pub mod dedup;
pub mod extract;
pub mod probe;

pub use dedup::dedup_frames;
pub use extract::extract_frames;
pub use probe::{check_duration, DurationCheck};
