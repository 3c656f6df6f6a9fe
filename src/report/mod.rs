pub mod document;
pub mod json;

pub use document::render_document;
pub use json::{build_report, report_json_bytes};
