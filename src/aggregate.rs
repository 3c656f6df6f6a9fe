use std::collections::HashSet;

use crate::models::{Category, Finding, ReportSummary, Severity};

/// Dedup keys compare only the leading portion of the normalized text, so
/// the same violation reported with trailing variations still collapses.
const DEDUP_KEY_PREFIX_LEN: usize = 120;

const HIGH_SEVERITY_KEYWORDS: &[&str] = &[
    "rodent",
    "droppings",
    "infestation",
    "cockroach",
    "sewage",
    "raw sewage",
    "mold",
    "danger zone",
    "expired",
    "critical",
    "severe",
    "immediate",
    "hazard",
];

const MEDIUM_SEVERITY_KEYWORDS: &[&str] = &[
    "unlabeled",
    "uncovered",
    "dirty",
    "grease",
    "buildup",
    "leak",
    "damaged",
    "improper",
    "blocked",
    "missing",
    "moderate",
];

/// Output of aggregating a session's raw findings: the deduplicated,
/// classified, severity-sorted list plus its summary counts. Both report
/// artifacts are derived from this one value.
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub findings: Vec<Finding>,
    pub summary: ReportSummary,
}

/// Merge the flattened findings of every media item and frame in a session.
/// Pure: callers supply the finding list in deterministic input order
/// (media order, then frame sequence), and identical input yields identical
/// output.
pub fn aggregate(findings: Vec<Finding>, media_analyzed: usize, media_failed: usize) -> Aggregated {
    let mut seen = HashSet::new();
    let mut merged: Vec<Finding> = Vec::new();

    for mut finding in findings {
        // Info findings mark clean sampled instants; keying them by their
        // source instant keeps every timestamp on the video timeline even
        // though their descriptions are identical.
        let key = if finding.severity == Some(Severity::Info) {
            format!(
                "{}|{}|{:?}",
                dedup_key(&finding.description),
                finding.source.item_index,
                finding.source.timestamp_secs
            )
        } else {
            dedup_key(&finding.description)
        };
        if !seen.insert(key) {
            continue;
        }

        if finding.severity.is_none() {
            finding.severity = Some(classify_severity(&finding.description));
        }
        if finding.category.is_none() {
            finding.category = Some(classify_category(&finding.description));
        }
        if finding.severity == Some(Severity::Info) {
            finding.citation = None;
        }
        merged.push(finding);
    }

    // Stable sort keeps the deterministic input order within each severity.
    merged.sort_by_key(|f| f.severity.map(|s| s.rank()).unwrap_or(u8::MAX));

    let summary = summarize(&merged, media_analyzed, media_failed);
    Aggregated {
        findings: merged,
        summary,
    }
}

/// Normalized dedup key: lowercase, punctuation stripped, whitespace
/// collapsed, truncated to a fixed prefix.
pub fn dedup_key(description: &str) -> String {
    let mut key = String::with_capacity(description.len());
    let mut last_was_space = true;
    for ch in description.chars() {
        if ch.is_alphanumeric() {
            key.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() || ch.is_ascii_punctuation() {
            if !last_was_space {
                key.push(' ');
                last_was_space = true;
            }
        }
    }
    while key.ends_with(' ') {
        key.pop();
    }
    key.chars().take(DEDUP_KEY_PREFIX_LEN).collect()
}

/// Keyword fallback for findings the model returned without a severity.
pub fn classify_severity(description: &str) -> Severity {
    let lower = description.to_lowercase();
    if HIGH_SEVERITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Severity::High
    } else if MEDIUM_SEVERITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Bucket a finding into the fixed category taxonomy. Checked in a fixed
/// order so overlapping vocabulary resolves deterministically.
pub fn classify_category(description: &str) -> Category {
    let lower = description.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|kw| lower.contains(kw));

    if matches(&["pest", "rodent", "insect", "droppings", "cockroach", "flies", "fly trap"]) {
        Category::PestControl
    } else if matches(&["cross-contamina", "cross contamina", "raw meat", "raw chicken", "ready-to-eat"]) {
        Category::CrossContamination
    } else if matches(&["temperature", "refriger", "freezer", "thaw", "hot holding", "cold holding", "storage", "stored"]) {
        Category::StorageTemperature
    } else if matches(&["hand", "glove", "hygiene", "sanitiz", "dirty", "unclean", "mold", "grease"]) {
        Category::Hygiene
    } else if matches(&["equipment", "floor", "wall", "ceiling", "lighting", "ventilation", "repair", "damaged", "leak", "drain"]) {
        Category::EquipmentFacilities
    } else {
        Category::Other
    }
}

fn summarize(findings: &[Finding], media_analyzed: usize, media_failed: usize) -> ReportSummary {
    let mut summary = ReportSummary {
        media_analyzed,
        media_failed,
        ..Default::default()
    };

    let mut category_counts: Vec<(Category, usize)> =
        Category::all().iter().map(|c| (*c, 0)).collect();

    for finding in findings {
        match finding.severity {
            Some(Severity::High) => summary.high += 1,
            Some(Severity::Medium) => summary.medium += 1,
            Some(Severity::Low) | None => summary.low += 1,
            Some(Severity::Info) => {
                summary.info += 1;
                continue;
            }
        }
        summary.total_violations += 1;
        if let Some(category) = finding.category {
            for entry in &mut category_counts {
                if entry.0 == category {
                    entry.1 += 1;
                }
            }
        }
    }

    summary.by_category = category_counts
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(category, count)| (category.as_str().to_string(), count))
        .collect();

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FindingSource;

    fn source(item_index: usize) -> FindingSource {
        FindingSource {
            item_id: format!("item-{item_index}"),
            item_index,
            frame_index: None,
            timestamp_secs: None,
            area: None,
        }
    }

    fn finding(description: &str) -> Finding {
        Finding::new(description, source(0))
    }

    #[test]
    fn dedup_key_ignores_punctuation_case_and_whitespace() {
        let a = dedup_key("Uncovered food   in walk-in cooler!");
        let b = dedup_key("uncovered food in walk in cooler");
        assert_eq!(a, b);
    }

    #[test]
    fn near_identical_descriptions_collapse_to_one_finding() {
        let out = aggregate(
            vec![
                finding("Grease buildup on hood filters."),
                finding("grease buildup on  hood filters"),
                finding("Floor drain is blocked"),
            ],
            1,
            0,
        );
        assert_eq!(out.findings.len(), 2);
    }

    #[test]
    fn missing_severity_defaults_through_the_keyword_vocabulary() {
        assert_eq!(classify_severity("rodent droppings under prep sink"), Severity::High);
        assert_eq!(classify_severity("unlabeled spray bottle on shelf"), Severity::Medium);
        assert_eq!(classify_severity("a ladle rests on the counter"), Severity::Low);
    }

    #[test]
    fn categories_bucket_by_keyword() {
        assert_eq!(
            classify_category("cockroach activity behind the oven"),
            Category::PestControl
        );
        assert_eq!(
            classify_category("raw chicken stored above produce"),
            Category::CrossContamination
        );
        assert_eq!(
            classify_category("refrigerator temperature at 48F"),
            Category::StorageTemperature
        );
        assert_eq!(
            classify_category("no gloves worn while plating"),
            Category::Hygiene
        );
        assert_eq!(
            classify_category("broken ceiling tile above prep area"),
            Category::EquipmentFacilities
        );
        assert_eq!(classify_category("poster missing from wall?"), Category::EquipmentFacilities);
        assert_eq!(classify_category("paperwork incomplete"), Category::Other);
    }

    #[test]
    fn findings_sort_high_medium_low() {
        let out = aggregate(
            vec![
                finding("minor scuff on door").with_severity(Severity::Low),
                finding("sewage backup in mop sink").with_severity(Severity::High),
                finding("grease on hood").with_severity(Severity::Medium),
            ],
            1,
            0,
        );
        let severities: Vec<_> = out.findings.iter().map(|f| f.severity.unwrap()).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium, Severity::Low]);
    }

    #[test]
    fn summary_counts_one_high_one_low() {
        let out = aggregate(
            vec![
                finding("blocked fire exit").with_severity(Severity::High),
                finding("faded floor marking").with_severity(Severity::Low),
            ],
            1,
            0,
        );
        assert_eq!(out.summary.high, 1);
        assert_eq!(out.summary.low, 1);
        assert_eq!(out.summary.medium, 0);
        assert_eq!(out.summary.total_violations, 2);
        assert_eq!(out.findings[0].severity, Some(Severity::High));
        assert_eq!(out.findings[1].severity, Some(Severity::Low));
    }

    #[test]
    fn info_findings_are_excluded_from_violation_counts_and_citations() {
        let out = aggregate(
            vec![
                finding("no violations observed at this timestamp")
                    .with_severity(Severity::Info)
                    .with_citation("should be stripped"),
                finding("dirty cutting board").with_severity(Severity::Medium),
            ],
            1,
            0,
        );
        assert_eq!(out.summary.total_violations, 1);
        assert_eq!(out.summary.info, 1);
        let info = out
            .findings
            .iter()
            .find(|f| f.severity == Some(Severity::Info))
            .unwrap();
        assert_eq!(info.citation, None);
    }

    #[test]
    fn clean_timestamps_keep_one_info_finding_per_instant() {
        let at = |ts: u64| FindingSource {
            item_id: "item-0".into(),
            item_index: 0,
            frame_index: Some(ts as usize),
            timestamp_secs: Some(ts),
            area: None,
        };
        let out = aggregate(
            (0..3)
                .map(|ts| {
                    Finding::new("No violations observed", at(ts)).with_severity(Severity::Info)
                })
                .collect(),
            1,
            0,
        );

        let timestamps: Vec<_> = out
            .findings
            .iter()
            .filter(|f| f.severity == Some(Severity::Info))
            .filter_map(|f| f.source.timestamp_secs)
            .collect();
        assert_eq!(timestamps, vec![0, 1, 2]);
        assert_eq!(out.summary.info, 3);
        assert_eq!(out.summary.total_violations, 0);
    }

    #[test]
    fn empty_categories_are_omitted_from_the_summary() {
        let out = aggregate(
            vec![finding("mouse droppings by rear door").with_severity(Severity::High)],
            1,
            0,
        );
        assert_eq!(out.summary.by_category.len(), 1);
        assert_eq!(out.summary.by_category[0].0, "pest control");
    }
}
