use serde::{Deserialize, Serialize};

/// Severity of a detected issue. `Info` means "no issue at this spot" and is
/// excluded from violation counts; it never carries a citation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Rendering rank: high sorts before medium before low before info.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 0,
            Severity::Medium => 1,
            Severity::Low => 2,
            Severity::Info => 3,
        }
    }

    pub fn is_violation(&self) -> bool {
        !matches!(self, Severity::Info)
    }
}

/// Fixed category taxonomy for grouping findings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    StorageTemperature,
    CrossContamination,
    Hygiene,
    EquipmentFacilities,
    PestControl,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::StorageTemperature => "storage & temperature",
            Category::CrossContamination => "cross-contamination",
            Category::Hygiene => "hygiene",
            Category::EquipmentFacilities => "equipment & facilities",
            Category::PestControl => "pest control",
            Category::Other => "other",
        }
    }

    pub fn all() -> [Category; 6] {
        [
            Category::StorageTemperature,
            Category::CrossContamination,
            Category::Hygiene,
            Category::EquipmentFacilities,
            Category::PestControl,
            Category::Other,
        ]
    }
}

/// Back-reference from a finding to the media it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FindingSource {
    pub item_id: String,
    /// Zero-based index of the media item within the session, used for the
    /// deterministic secondary ordering of aggregated findings.
    pub item_index: usize,
    /// For video: index of the surviving frame this finding came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<usize>,
    /// For video: sampled second within the source video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

/// One detected (or absent) compliance issue from a single image or frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    pub source: FindingSource,
}

impl Finding {
    pub fn new(description: impl Into<String>, source: FindingSource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            category: None,
            severity: None,
            confidence: 0.5,
            citation: None,
            source,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        // Info findings never carry a citation.
        if severity == Severity::Info {
            self.citation = None;
        }
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_citation(mut self, citation: impl Into<String>) -> Self {
        if self.severity != Some(Severity::Info) {
            self.citation = Some(citation.into());
        }
        self
    }
}
