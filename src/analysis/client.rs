use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::error::{PipelineError, PipelineResult};
use crate::settings::Settings;
use crate::{log_info, log_warn};

use super::parser::{parse_response, ParsedFinding};

const REQUEST_TIMEOUT_SECS: u64 = 90;

/// Result of analyzing one image: the parsed findings plus the raw model
/// text they came from.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub findings: Vec<ParsedFinding>,
    pub raw_text: String,
}

impl AnalysisOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Transport seam to the external vision model: submit one image reference
/// plus an instruction string, get back free text. Fakes implement this in
/// tests; `HttpVisionTransport` is the real thing.
pub trait VisionTransport: Send + Sync + 'static {
    fn complete(
        &self,
        image_url: &str,
        prompt: &str,
    ) -> impl Future<Output = PipelineResult<String>> + Send;
}

/// OpenAI-style chat-completions transport.
pub struct HttpVisionTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpVisionTransport {
    pub fn new(settings: &Settings) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| PipelineError::Configuration(format!("http client: {err}")))?;

        Ok(Self {
            client,
            endpoint: settings.vision_endpoint.clone(),
            api_key: settings.vision_api_key.clone(),
            model: settings.vision_model.clone(),
        })
    }
}

impl VisionTransport for HttpVisionTransport {
    fn complete(
        &self,
        image_url: &str,
        prompt: &str,
    ) -> impl Future<Output = PipelineResult<String>> + Send {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": prompt},
                        {"type": "image_url", "image_url": {"url": image_url}}
                    ]
                }],
                "max_tokens": 1024
            }));

        async move {
            let response = request
                .send()
                .await
                .map_err(|err| PipelineError::AnalysisFailed(format!("request failed: {err}")))?
                .error_for_status()
                .map_err(|err| PipelineError::AnalysisFailed(format!("model returned {err}")))?;

            let body: Value = response
                .json()
                .await
                .map_err(|err| PipelineError::AnalysisFailed(format!("bad response body: {err}")))?;

            body["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    PipelineError::AnalysisFailed("response carried no message content".into())
                })
        }
    }
}

/// Submits images to the vision model and parses whatever comes back.
/// Batch calls run in bounded concurrency windows with a pause in between
/// to respect model rate limits.
pub struct VisionClient<T: VisionTransport> {
    transport: Arc<T>,
    window: usize,
    window_pause: Duration,
    prompt: String,
}

impl VisionClient<HttpVisionTransport> {
    pub fn from_settings(settings: &Settings) -> PipelineResult<Self> {
        Ok(Self::new(
            HttpVisionTransport::new(settings)?,
            settings.analysis_window,
            Duration::from_millis(settings.window_pause_ms),
        ))
    }
}

impl<T: VisionTransport> VisionClient<T> {
    pub fn new(transport: T, window: usize, window_pause: Duration) -> Self {
        Self {
            transport: Arc::new(transport),
            window: window.max(1),
            window_pause,
            prompt: build_prompt(),
        }
    }

    /// Analyze a single image reference.
    pub async fn analyze(&self, image_url: &str) -> PipelineResult<AnalysisOutcome> {
        let raw_text = self.transport.complete(image_url, &self.prompt).await?;
        Ok(AnalysisOutcome {
            findings: parse_response(&raw_text),
            raw_text,
        })
    }

    /// Analyze a batch of image references. The returned vector matches the
    /// input order and length: a single image's failure yields an empty
    /// outcome at its slot, never a failed batch. Cancellation lets the
    /// in-flight window drain and skips the windows after it.
    pub async fn analyze_batch(
        &self,
        image_urls: &[String],
        cancel: &CancellationToken,
    ) -> Vec<AnalysisOutcome> {
        let mut outcomes: Vec<AnalysisOutcome> =
            (0..image_urls.len()).map(|_| AnalysisOutcome::empty()).collect();

        for (chunk_idx, chunk) in image_urls.chunks(self.window).enumerate() {
            if cancel.is_cancelled() {
                log_warn!(
                    "analysis cancelled, skipping {} remaining image(s)",
                    image_urls.len() - chunk_idx * self.window
                );
                break;
            }
            if chunk_idx > 0 {
                tokio::time::sleep(self.window_pause).await;
            }

            let mut in_flight = JoinSet::new();
            for (offset, url) in chunk.iter().enumerate() {
                let index = chunk_idx * self.window + offset;
                let transport = Arc::clone(&self.transport);
                let prompt = self.prompt.clone();
                let url = url.clone();
                in_flight.spawn(async move {
                    let result = transport.complete(&url, &prompt).await;
                    (index, result)
                });
            }

            while let Some(joined) = in_flight.join_next().await {
                match joined {
                    Ok((index, Ok(raw_text))) => {
                        outcomes[index] = AnalysisOutcome {
                            findings: parse_response(&raw_text),
                            raw_text,
                        };
                    }
                    Ok((index, Err(err))) => {
                        log_warn!("analysis failed for image {index}: {err}");
                    }
                    Err(err) => {
                        log_warn!("analysis task join failed: {err}");
                    }
                }
            }
        }

        log_info!(
            "analyzed {} image(s), {} produced findings",
            image_urls.len(),
            outcomes.iter().filter(|o| !o.findings.is_empty()).count()
        );

        outcomes
    }
}

fn build_prompt() -> String {
    concat!(
        "You are a premises compliance inspector. Examine this photograph of a ",
        "commercial facility and list every regulatory violation you can see: ",
        "food storage and temperature, cross-contamination, hygiene, equipment ",
        "and facilities condition, and pest control.\n\n",
        "Respond with JSON of the form ",
        "{\"violations\": [{\"violation\": \"...\", \"severity\": \"high|medium|low\", ",
        "\"citation\": \"...\", \"confidence\": 0.0}]}. ",
        "Use an empty list when the image shows no violations. ",
        "If you cannot produce JSON, write one block per issue:\n",
        "VIOLATION: <description>\nSEVERITY: <high|medium|low>\nCITATION: <code>"
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    struct FakeTransport {
        fail_on: Option<String>,
    }

    impl VisionTransport for FakeTransport {
        fn complete(
            &self,
            image_url: &str,
            _prompt: &str,
        ) -> impl Future<Output = PipelineResult<String>> + Send {
            let url = image_url.to_string();
            let fail_on = self.fail_on.clone();
            async move {
                if fail_on.as_deref() == Some(url.as_str()) {
                    Err(PipelineError::AnalysisFailed("model unavailable".into()))
                } else {
                    Ok(format!("VIOLATION: issue seen in {url}\nSEVERITY: Low"))
                }
            }
        }
    }

    fn client(fail_on: Option<&str>) -> VisionClient<FakeTransport> {
        VisionClient::new(
            FakeTransport {
                fail_on: fail_on.map(str::to_string),
            },
            3,
            Duration::from_millis(0),
        )
    }

    #[tokio::test]
    async fn single_analysis_parses_the_response() {
        let outcome = client(None).analyze("img-1").await.unwrap();
        assert_eq!(outcome.findings.len(), 1);
        assert_eq!(outcome.findings[0].severity, Severity::Low);
        assert!(outcome.raw_text.contains("img-1"));
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let urls: Vec<String> = (0..7).map(|i| format!("img-{i}")).collect();
        let outcomes = client(None)
            .analyze_batch(&urls, &CancellationToken::new())
            .await;

        assert_eq!(outcomes.len(), 7);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert!(outcome.raw_text.contains(&format!("img-{i}")));
        }
    }

    #[tokio::test]
    async fn one_failed_image_does_not_fail_the_batch() {
        let urls: Vec<String> = (0..4).map(|i| format!("img-{i}")).collect();
        let outcomes = client(Some("img-2"))
            .analyze_batch(&urls, &CancellationToken::new())
            .await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[2].findings.is_empty());
        assert!(outcomes[2].raw_text.is_empty());
        assert_eq!(outcomes[3].findings.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_batch_skips_remaining_windows() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let urls: Vec<String> = (0..5).map(|i| format!("img-{i}")).collect();
        let outcomes = client(None).analyze_batch(&urls, &cancel).await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.findings.is_empty()));
    }
}
