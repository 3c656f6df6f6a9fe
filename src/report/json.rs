use chrono::{DateTime, Utc};

use crate::aggregate::Aggregated;
use crate::error::{PipelineError, PipelineResult};
use crate::models::SessionReport;

/// Build the machine-readable report from the aggregated state. Everything
/// except `generated_at` is a pure function of the input, so reprocessing
/// identical media yields an identical report.
pub fn build_report(
    session_id: &str,
    aggregated: &Aggregated,
    generated_at: DateTime<Utc>,
) -> SessionReport {
    SessionReport {
        session_id: session_id.to_string(),
        generated_at,
        summary: aggregated.summary.clone(),
        findings: aggregated.findings.clone(),
        document_url: None,
    }
}

pub fn report_json_bytes(report: &SessionReport) -> PipelineResult<Vec<u8>> {
    serde_json::to_vec_pretty(report)
        .map_err(|err| PipelineError::Render(format!("report serialization failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::{Finding, FindingSource, Severity};
    use chrono::TimeZone;

    fn sample_aggregated() -> Aggregated {
        let source = FindingSource {
            item_id: "item-1".into(),
            item_index: 0,
            frame_index: None,
            timestamp_secs: None,
            area: Some("Kitchen".into()),
        };
        aggregate(
            vec![
                Finding::new("dirty prep surface", source.clone()).with_severity(Severity::Medium),
                Finding::new("mouse droppings by door", source).with_severity(Severity::High),
            ],
            2,
            0,
        )
    }

    #[test]
    fn identical_input_produces_byte_identical_json_modulo_timestamp() {
        let aggregated = sample_aggregated();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = report_json_bytes(&build_report("sess-1", &aggregated, at)).unwrap();
        let second = report_json_bytes(&build_report(
            "sess-1",
            &aggregated,
            Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
        ))
        .unwrap();

        let mut a: serde_json::Value = serde_json::from_slice(&first).unwrap();
        let mut b: serde_json::Value = serde_json::from_slice(&second).unwrap();
        a.as_object_mut().unwrap().remove("generatedAt");
        b.as_object_mut().unwrap().remove("generatedAt");
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn report_carries_summary_and_ordered_findings() {
        let aggregated = sample_aggregated();
        let report = build_report("sess-1", &aggregated, Utc::now());
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.summary.medium, 1);
        assert_eq!(report.findings[0].severity, Some(Severity::High));
        assert_eq!(report.document_url, None);
    }
}
