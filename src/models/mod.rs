pub mod finding;
pub mod report;
pub mod session;

pub use finding::{Category, Finding, FindingSource, Severity};
pub use report::{ReportSummary, SessionReport};
pub use session::{ItemOutcome, ItemStatus, MediaItem, MediaKind, Session};
