//! HttpGenerationClient - REST client for the card generation service.
//!
//! Endpoints (relative to the configured base URL):
//!
//! - `POST /generate`: JSON body, NDJSON response. Every line is either a
//!   stage event `{"stage": ..., "data": ...}`, a failure
//!   `{"error": ..., "kind": ...}`, or the terminating `{"cards": [...]}`.
//! - `POST /cancel/{request_id}`: cooperative cancellation.
//! - `POST /analyze`: `{text, model}` → `{summary, analysisId}`.

use async_trait::async_trait;
use cardsmith_core::card::Card;
use cardsmith_core::config::ServiceConfig;
use cardsmith_core::error::{CardsmithError, Result};
use cardsmith_core::generation::{
    AnalysisResult, AnalysisService, CardType, GenerationJob, GenerationService, RawStageEvent,
    StageErrorKind, StageSink,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequestBody<'a> {
    request_id: &'a str,
    content: &'a str,
    deck_names: &'a [String],
    context: &'a str,
    card_type: CardType,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation_model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_model: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_map")]
    custom_prompts: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_cards: Option<u32>,
}

impl<'a> GenerateRequestBody<'a> {
    fn from_job(job: &'a GenerationJob) -> Self {
        let options = &job.options;
        Self {
            request_id: &job.request_id,
            content: &job.content,
            deck_names: &options.deck_names,
            context: &job.context,
            card_type: options.card_type,
            model: options.model.as_deref(),
            analysis_id: job.analysis_id.as_deref(),
            validation_model: options.validation_model.as_deref(),
            analysis_model: options.analysis_model.as_deref(),
            custom_prompts: &options.custom_prompts,
            max_cards: options.max_cards,
        }
    }
}

fn is_empty_map(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

#[derive(Debug, Serialize)]
struct AnalyzeRequestBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Service-reported failure, either as an NDJSON line or an error body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody {
    error: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default, alias = "recommended_max")]
    recommended_max: Option<u32>,
}

impl FailureBody {
    fn into_error(self) -> CardsmithError {
        match self.kind.as_deref().map(StageErrorKind::parse) {
            Some(StageErrorKind::ContentScarcity) => CardsmithError::ContentScarcity {
                message: self.error,
                recommended_max: self.recommended_max,
            },
            Some(StageErrorKind::Transport) | Some(StageErrorKind::Timeout) => {
                CardsmithError::transport(self.error)
            }
            _ => CardsmithError::service(self.error),
        }
    }
}

/// One decoded NDJSON line of the generate stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum StreamLine {
    Cards { cards: Vec<Card> },
    Failure(FailureBody),
    Stage(RawStageEvent),
}

/// Decodes one NDJSON line. Blank lines yield `None`.
fn parse_stream_line(line: &str) -> Result<Option<StreamLine>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some).map_err(|err| {
        CardsmithError::service(format!("Malformed stream line ({err}): {line}"))
    })
}

/// Maps a non-success HTTP response to an engine error.
fn map_http_error(status: StatusCode, body: &str) -> CardsmithError {
    if let Ok(failure) = serde_json::from_str::<FailureBody>(body) {
        if failure.kind.is_some() || !status.is_server_error() {
            return failure.into_error();
        }
    }
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            CardsmithError::transport(message)
        }
        _ => CardsmithError::service(message),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CardsmithError {
    if err.is_timeout() {
        CardsmithError::transport(format!("Request timed out: {err}"))
    } else if err.is_connect() {
        CardsmithError::transport(format!(
            "Could not connect to the generation service: {err}"
        ))
    } else {
        CardsmithError::transport(err.to_string())
    }
}

/// Client for the remote generation and analysis service.
#[derive(Clone)]
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| CardsmithError::config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::new(config.base_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        Err(map_http_error(status, &body))
    }

    /// Reads the NDJSON stream until the terminating `cards` line.
    async fn consume_stream(
        &self,
        mut response: Response,
        job: &GenerationJob,
        sink: &StageSink,
    ) -> Result<Vec<Card>> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut result: Option<Vec<Card>> = None;

        loop {
            let chunk = tokio::select! {
                _ = job.cancellation_token.cancelled() => {
                    tracing::info!("[HttpGeneration] Request {} aborted", job.request_id);
                    return Err(CardsmithError::aborted(format!(
                        "request {} aborted",
                        job.request_id
                    )));
                }
                chunk = response.chunk() => chunk.map_err(map_reqwest_error)?,
            };

            let Some(bytes) = chunk else {
                break;
            };
            buffer.extend_from_slice(&bytes);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                Self::handle_line(&line, sink, &mut result)?;
            }
        }

        if !buffer.is_empty() {
            Self::handle_line(&buffer, sink, &mut result)?;
        }

        result.ok_or_else(|| {
            CardsmithError::service(format!(
                "Generation stream for {} ended without a result",
                job.request_id
            ))
        })
    }

    fn handle_line(line: &[u8], sink: &StageSink, result: &mut Option<Vec<Card>>) -> Result<()> {
        let line = String::from_utf8_lossy(line);
        match parse_stream_line(&line)? {
            None => {}
            Some(StreamLine::Stage(event)) => {
                tracing::debug!("[HttpGeneration] Stage '{}'", event.stage);
                if !sink.emit(event) {
                    tracing::debug!("[HttpGeneration] Stage listener gone, dropping event");
                }
            }
            Some(StreamLine::Cards { cards }) => {
                *result = Some(cards);
            }
            Some(StreamLine::Failure(failure)) => return Err(failure.into_error()),
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, job: GenerationJob, sink: StageSink) -> Result<Vec<Card>> {
        let body = GenerateRequestBody::from_job(&job);
        tracing::info!(
            "[HttpGeneration] POST /generate request={} chars={}",
            job.request_id,
            job.content.chars().count()
        );

        let send = self
            .client
            .post(self.endpoint("generate"))
            .header("accept", "application/x-ndjson")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = job.cancellation_token.cancelled() => {
                return Err(CardsmithError::aborted(format!(
                    "request {} aborted before response",
                    job.request_id
                )));
            }
            response = send => response.map_err(map_reqwest_error)?,
        };
        let response = Self::ensure_success(response).await?;

        self.consume_stream(response, &job, &sink).await
    }

    async fn cancel_request(&self, request_id: &str) -> Result<()> {
        tracing::info!("[HttpGeneration] POST /cancel/{}", request_id);
        let response = self
            .client
            .post(self.endpoint(&format!("cancel/{request_id}")))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AnalysisService for HttpGenerationClient {
    async fn analyze(&self, text: &str, model: Option<&str>) -> Result<AnalysisResult> {
        tracing::info!(
            "[HttpGeneration] POST /analyze chars={}",
            text.chars().count()
        );
        let response = self
            .client
            .post(self.endpoint("analyze"))
            .json(&AnalyzeRequestBody { text, model })
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = Self::ensure_success(response).await?;

        response
            .json::<AnalysisResult>()
            .await
            .map_err(|err| CardsmithError::service(format!("Failed to parse analysis: {err}")))
    }
}
