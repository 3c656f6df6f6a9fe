use serde_json::Value;

use crate::aggregate::classify_severity;
use crate::models::Severity;

const DEFAULT_CONFIDENCE: f64 = 0.7;
const RAW_FALLBACK_CONFIDENCE: f64 = 0.2;

/// A finding as parsed from a model response, before it is attributed to a
/// media item.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFinding {
    pub description: String,
    pub severity: Severity,
    pub citation: Option<String>,
    pub confidence: f64,
}

impl ParsedFinding {
    fn info(description: &str) -> Self {
        Self {
            description: description.to_string(),
            severity: Severity::Info,
            citation: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Parse a model response under the tolerant strategy chain: strict
/// structured JSON first, then marker-based text, then a raw-text fallback
/// so a non-empty response is never silently discarded.
pub fn parse_response(text: &str) -> Vec<ParsedFinding> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Some(findings) = parse_structured(trimmed) {
        return findings;
    }
    if let Some(findings) = parse_marked_text(trimmed) {
        return findings;
    }

    vec![ParsedFinding {
        description: trimmed.to_string(),
        severity: Severity::Low,
        citation: None,
        confidence: RAW_FALLBACK_CONFIDENCE,
    }]
}

/// Strategy (a): the response is JSON carrying explicit violation records,
/// either as a top-level array or under a `violations`/`findings` key.
/// An explicitly empty violation list parses to a single info finding so a
/// clean frame still shows up on the timeline.
pub fn parse_structured(text: &str) -> Option<Vec<ParsedFinding>> {
    let value: Value = serde_json::from_str(strip_code_fence(text)).ok()?;

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("violations")
            .or_else(|| map.get("findings"))
            .and_then(Value::as_array)?
            .as_slice(),
        _ => return None,
    };

    if items.is_empty() {
        return Some(vec![ParsedFinding::info("No violations observed")]);
    }

    let findings: Vec<ParsedFinding> = items.iter().filter_map(parse_structured_item).collect();
    if findings.is_empty() {
        None
    } else {
        Some(findings)
    }
}

fn parse_structured_item(item: &Value) -> Option<ParsedFinding> {
    let obj = item.as_object()?;
    let description = ["violation", "description", "issue"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))?
        .trim()
        .to_string();
    if description.is_empty() {
        return None;
    }

    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .and_then(parse_severity)
        .unwrap_or_else(|| classify_severity(&description));

    let citation = obj
        .get("citation")
        .or_else(|| obj.get("code"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    Some(ParsedFinding {
        description,
        severity,
        citation,
        confidence,
    })
}

/// Strategy (b): free text with explicit section markers. Severity falls
/// back to keyword inference when the model omits the field.
pub fn parse_marked_text(text: &str) -> Option<Vec<ParsedFinding>> {
    let lower = text.to_lowercase();
    if lower.contains("no violations") && !lower.contains("violation:") {
        return Some(vec![ParsedFinding::info("No violations observed")]);
    }

    let mut findings = Vec::new();
    let mut current: Option<ParsedFinding> = None;

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', ' ']);
        if let Some(rest) = strip_marker(line, "violation:") {
            if let Some(done) = current.take() {
                findings.push(done);
            }
            current = Some(ParsedFinding {
                description: rest.to_string(),
                severity: classify_severity(rest),
                citation: None,
                confidence: DEFAULT_CONFIDENCE,
            });
        } else if let Some(rest) = strip_marker(line, "severity:") {
            if let Some(finding) = current.as_mut() {
                if let Some(severity) = parse_severity(rest) {
                    finding.severity = severity;
                }
            }
        } else if let Some(rest) = strip_marker(line, "citation:") {
            if let Some(finding) = current.as_mut() {
                if !rest.is_empty() {
                    finding.citation = Some(rest.to_string());
                }
            }
        }
    }

    if let Some(done) = current.take() {
        findings.push(done);
    }

    if findings.is_empty() {
        None
    } else {
        Some(findings)
    }
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        Some(line[marker.len()..].trim())
    } else {
        None
    }
}

fn parse_severity(raw: &str) -> Option<Severity> {
    match raw.trim().to_lowercase().as_str() {
        "high" | "critical" => Some(Severity::High),
        "medium" | "moderate" => Some(Severity::Medium),
        "low" | "minor" => Some(Severity::Low),
        "info" | "none" => Some(Severity::Info),
        _ => None,
    }
}

/// Models often wrap JSON in a markdown code fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}
