use std::path::Path;

use base64::Engine;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::aggregate::aggregate;
use crate::analysis::{AnalysisOutcome, VisionClient, VisionTransport};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    Finding, FindingSource, ItemOutcome, ItemStatus, MediaItem, MediaKind, Session, SessionReport,
    Severity,
};
use crate::report::{build_report, render_document, report_json_bytes};
use crate::settings::Settings;
use crate::store::{BlobStore, RecordStore};
use crate::video::{check_duration, dedup_frames, extract_frames};
use crate::{log_error, log_info, log_warn};

use super::scratch::Scratch;

/// What the caller gets back from a run: one terminal outcome per media
/// item, plus whatever aggregate report could be built from the items that
/// succeeded.
#[derive(Debug, Clone)]
pub struct SessionRunResult {
    pub outcomes: Vec<ItemOutcome>,
    pub report: SessionReport,
}

struct ItemAnalysis {
    findings: Vec<Finding>,
    frames_analyzed: Option<usize>,
}

/// Drives every media item of a session through the pipeline stages,
/// isolates per-item failures, aggregates, persists, and cleans up scratch
/// storage on every exit path.
pub struct SessionProcessor<'a, T, B, R>
where
    T: VisionTransport,
    B: BlobStore,
    R: RecordStore,
{
    settings: &'a Settings,
    vision: &'a VisionClient<T>,
    blobs: &'a B,
    records: &'a R,
}

impl<'a, T, B, R> SessionProcessor<'a, T, B, R>
where
    T: VisionTransport,
    B: BlobStore,
    R: RecordStore,
{
    pub fn new(
        settings: &'a Settings,
        vision: &'a VisionClient<T>,
        blobs: &'a B,
        records: &'a R,
    ) -> Self {
        Self {
            settings,
            vision,
            blobs,
            records,
        }
    }

    /// Process every media item of a session. One item's failure never
    /// changes the processing of its siblings; the aggregated finding order
    /// is deterministic (media order, then frame sequence).
    pub async fn process_session(
        &self,
        session: &Session,
        items: &[MediaItem],
        cancel: &CancellationToken,
    ) -> SessionRunResult {
        let scratch = Scratch::new(&self.settings.scratch_root, &session.id);
        let mut outcomes: Vec<ItemOutcome> = Vec::with_capacity(items.len());
        let mut all_findings: Vec<Finding> = Vec::new();

        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                outcomes.push(ItemOutcome::failed(
                    item,
                    "run cancelled before this item was processed",
                ));
                continue;
            }

            let result = self.process_item(item, index, &scratch, cancel).await;
            // per-item scratch goes away no matter how the item ended
            scratch.cleanup_item(item).await;

            match result {
                Ok(analysis) => {
                    log_info!(
                        "item {} done with {} finding(s)",
                        item.id,
                        analysis.findings.len()
                    );
                    outcomes.push(ItemOutcome::done(
                        item,
                        analysis.findings.len(),
                        analysis.frames_analyzed,
                    ));
                    all_findings.extend(analysis.findings);
                }
                Err(err) => {
                    log_warn!("item {} failed: {err}", item.id);
                    outcomes.push(ItemOutcome::failed(item, err.to_string()));
                }
            }
        }

        let analyzed = outcomes
            .iter()
            .filter(|o| o.status == ItemStatus::Done)
            .count();
        let failed = outcomes.len() - analyzed;
        let aggregated = aggregate(all_findings, analyzed, failed);
        let mut report = build_report(&session.id, &aggregated, Utc::now());

        self.deliver_document(session, &mut report).await;
        self.persist(session, &report).await;

        scratch.cleanup_all().await;

        SessionRunResult { outcomes, report }
    }

    async fn process_item(
        &self,
        item: &MediaItem,
        index: usize,
        scratch: &Scratch,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemAnalysis> {
        log_info!(
            "item {} ({}): {}",
            item.id,
            item.kind.as_str(),
            ItemStatus::Pending.as_str()
        );
        let bytes = self
            .blobs
            .download(&self.settings.media_bucket, &item.storage_path)
            .await?;
        log_info!("item {}: {}", item.id, ItemStatus::Downloaded.as_str());

        match item.kind {
            MediaKind::Image => self.analyze_image(item, index, bytes, cancel).await,
            MediaKind::Video => self.analyze_video(item, index, bytes, scratch, cancel).await,
        }
    }

    async fn analyze_image(
        &self,
        item: &MediaItem,
        index: usize,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemAnalysis> {
        let refs = vec![image_data_url(&bytes)];
        let outcomes = self.vision.analyze_batch(&refs, cancel).await;
        let findings = attribute_findings(outcomes, item, index, None);
        Ok(ItemAnalysis {
            findings,
            frames_analyzed: None,
        })
    }

    async fn analyze_video(
        &self,
        item: &MediaItem,
        index: usize,
        bytes: Vec<u8>,
        scratch: &Scratch,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemAnalysis> {
        let item_dir = scratch.item_dir(item);
        tokio::fs::create_dir_all(&item_dir).await.map_err(|err| {
            PipelineError::ItemFetch(format!("scratch dir {}: {err}", item_dir.display()))
        })?;
        let video_path = item_dir.join(source_file_name(&item.storage_path));
        tokio::fs::write(&video_path, &bytes).await.map_err(|err| {
            PipelineError::ItemFetch(format!("temp video copy failed: {err}"))
        })?;
        drop(bytes);

        let check = check_duration(&video_path, self.settings.max_video_minutes).await;
        if !check.valid {
            return Err(match check.duration_minutes {
                Some(minutes) => PipelineError::DurationExceeded {
                    actual_minutes: minutes,
                    max_minutes: check.max_duration_minutes,
                },
                None => PipelineError::ExtractionFailed {
                    message: check
                        .error
                        .unwrap_or_else(|| "duration probe failed".into()),
                    tool_missing: false,
                },
            });
        }

        log_info!("item {}: {}", item.id, ItemStatus::Extracting.as_str());
        let frames = extract_frames(&video_path, &scratch.frame_dir(item)).await?;

        log_info!(
            "item {}: {} {} frame(s)",
            item.id,
            ItemStatus::Deduplicating.as_str(),
            frames.len()
        );
        let (kept, degraded) = dedup_frames(frames).await;
        if degraded {
            log_warn!(
                "item {}: {}",
                item.id,
                PipelineError::DeduplicationDegraded("analyzing the full frame set".into())
            );
        }

        let mut refs = Vec::with_capacity(kept.len());
        let mut frame_meta = Vec::with_capacity(kept.len());
        for (frame_index, frame_path) in kept.iter().enumerate() {
            match tokio::fs::read(frame_path).await {
                Ok(frame_bytes) => {
                    refs.push(image_data_url(&frame_bytes));
                    frame_meta.push((frame_index, frame_timestamp(frame_path)));
                }
                Err(err) => {
                    log_warn!("skipping unreadable frame {}: {err}", frame_path.display());
                }
            }
        }

        log_info!(
            "item {}: {} {} frame(s)",
            item.id,
            ItemStatus::Analyzing.as_str(),
            refs.len()
        );
        let outcomes = self.vision.analyze_batch(&refs, cancel).await;
        let findings = attribute_findings(outcomes, item, index, Some(&frame_meta));

        Ok(ItemAnalysis {
            findings,
            frames_analyzed: Some(refs.len()),
        })
    }

    /// Render and upload the printable document. Failures here are logged
    /// and never discard the aggregated results.
    async fn deliver_document(&self, session: &Session, report: &mut SessionReport) {
        let bytes = match render_document(session, report) {
            Ok(bytes) => bytes,
            Err(err) => {
                log_error!("document render failed for session {}: {err}", session.id);
                return;
            }
        };

        let path = format!("{}/report.pdf", session.id);
        match self
            .blobs
            .upload(&self.settings.report_bucket, &path, bytes, "application/pdf")
            .await
        {
            Ok(url) => report.document_url = Some(url),
            Err(err) => {
                log_error!("document upload failed for session {}: {err}", session.id);
            }
        }

        // machine-readable copy next to the PDF, including the document URL
        match report_json_bytes(report) {
            Ok(json_bytes) => {
                let json_path = format!("{}/report.json", session.id);
                if let Err(err) = self
                    .blobs
                    .upload(
                        &self.settings.report_bucket,
                        &json_path,
                        json_bytes,
                        "application/json",
                    )
                    .await
                {
                    log_error!("report json upload failed for session {}: {err}", session.id);
                }
            }
            Err(err) => {
                log_error!("report serialization failed for session {}: {err}", session.id);
            }
        }
    }

    /// Write findings and the report record. Persistence failures are
    /// logged; the caller still receives the in-memory results.
    async fn persist(&self, session: &Session, report: &SessionReport) {
        if let Err(err) = self
            .records
            .insert_findings(session.id.clone(), report.findings.clone())
            .await
        {
            log_error!("finding insert failed for session {}: {err}", session.id);
        }
        if let Err(err) = self.records.upsert_report(report.clone()).await {
            log_error!("report upsert failed for session {}: {err}", session.id);
        }
    }
}

fn attribute_findings(
    outcomes: Vec<AnalysisOutcome>,
    item: &MediaItem,
    item_index: usize,
    frame_meta: Option<&[(usize, Option<u64>)]>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (outcome_index, outcome) in outcomes.into_iter().enumerate() {
        let (frame_index, timestamp_secs) = match frame_meta {
            Some(meta) => meta
                .get(outcome_index)
                .map(|(idx, ts)| (Some(*idx), *ts))
                .unwrap_or((None, None)),
            None => (None, None),
        };
        for parsed in outcome.findings {
            let source = FindingSource {
                item_id: item.id.clone(),
                item_index,
                frame_index,
                timestamp_secs,
                area: item.area.clone(),
            };
            let mut finding = Finding::new(parsed.description, source)
                .with_severity(parsed.severity)
                .with_confidence(parsed.confidence);
            if parsed.severity != Severity::Info {
                if let Some(citation) = parsed.citation {
                    finding = finding.with_citation(citation);
                }
            }
            findings.push(finding);
        }
    }
    findings
}

fn image_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Sampled second of a frame file named by the extractor (`frame_0001.jpg`
/// is the first sampled second).
fn frame_timestamp(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem.chars().filter(|c| c.is_ascii_digit()).collect();
    let sequence: u64 = digits.parse().ok()?;
    Some(sequence.saturating_sub(1))
}

fn source_file_name(storage_path: &str) -> String {
    storage_path
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("source.bin")
        .to_string()
}
