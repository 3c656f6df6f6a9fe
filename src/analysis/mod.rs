pub mod client;
pub mod parser;

pub use client::{AnalysisOutcome, VisionClient, VisionTransport};
pub use parser::{parse_response, ParsedFinding};
