//! The request handler: one envelope in, one envelope out. Parsing, decoding
//! and the detector call all fail into `HandlerError`, which is only turned
//! into a response at the very end of `Handler::handle`

use crate::detector::{DetectError, DetectedLabel, DetectionPolicy, LabelDetector};
use crate::protocol::*;
use anyhow::anyhow;
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use thiserror::Error;
use tracing::*;

pub const MISSING_IMAGE: &str = "Missing 'base64Image' in request body.";
pub const ANALYSIS_COMPLETE: &str = "AI analysis complete.";

#[derive(Debug, Error)]
pub enum HandlerError {
    /// `base64Image` is absent, null or empty
    #[error("{}", MISSING_IMAGE)]
    Validation,

    /// The detection service rejected the request
    #[error("Rekognition Client Error: {0}")]
    ExternalService(String),

    /// Everything else: bad JSON, bad base64, transport failures
    #[error("An unexpected error occurred: {0}")]
    Unexpected(anyhow::Error),
}

impl HandlerError {
    pub fn status_code(&self) -> u16 {
        match self {
            HandlerError::Validation => 400,
            HandlerError::ExternalService(_) | HandlerError::Unexpected(_) => 500,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::Unexpected(err)
    }
}

impl From<base64::DecodeError> for HandlerError {
    fn from(err: base64::DecodeError) -> Self {
        HandlerError::Unexpected(anyhow!(err))
    }
}

impl From<DetectError> for HandlerError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Service { message } => HandlerError::ExternalService(message),
            transport => HandlerError::Unexpected(anyhow!(transport)),
        }
    }
}

impl From<HandlerError> for ResponseEnvelope {
    fn from(err: HandlerError) -> Self {
        ResponseEnvelope::json(
            err.status_code(),
            &ErrorBody {
                error: err.to_string(),
            },
        )
    }
}

/// Stateless request handler. Cheap to share: the detector is read-only and
/// the policy is copied into every call
pub struct Handler {
    detector: Arc<dyn LabelDetector>,
    policy: DetectionPolicy,
}

impl Handler {
    pub fn new(detector: Arc<dyn LabelDetector>, policy: DetectionPolicy) -> Self {
        Self { detector, policy }
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.policy
    }

    /// Run one invocation. Never fails: every error becomes an error envelope
    pub async fn handle(&self, event: &RequestEnvelope) -> ResponseEnvelope {
        debug!(
            "received event (body = {:?} bytes)",
            event.body.as_ref().map(String::len)
        );

        match self.analyze(event).await {
            Ok(body) => {
                info!(
                    "analysis complete: {} labels for {} bytes",
                    body.labels.len(),
                    body.input_size_bytes
                );
                ResponseEnvelope::json(200, &body)
            }
            Err(err) => failure(err),
        }
    }

    /// Error envelope for a request that never reached `handle`, e.g. an
    /// HTTP body that is not UTF-8
    pub fn unexpected(&self, cause: anyhow::Error) -> ResponseEnvelope {
        failure(HandlerError::Unexpected(cause))
    }

    async fn analyze(&self, event: &RequestEnvelope) -> Result<AnalysisBody, HandlerError> {
        let body = event
            .body
            .as_deref()
            .ok_or_else(|| HandlerError::Unexpected(anyhow!("request has no body")))?;

        let payload = ImagePayload::parse(body)?;
        let encoded = match payload.base64_image.as_deref() {
            Some(encoded) if !encoded.is_empty() => encoded,
            _ => return Err(HandlerError::Validation),
        };

        let image = decode_image(encoded)?;
        let input_size_bytes = image.len();

        let labels = self
            .detector
            .detect_labels(image, self.policy)
            .await?
            .into_iter()
            .map(Label::from)
            .collect();

        Ok(AnalysisBody {
            message: ANALYSIS_COMPLETE.to_string(),
            labels,
            input_size_bytes,
        })
    }
}

fn failure(err: HandlerError) -> ResponseEnvelope {
    match &err {
        HandlerError::Validation => warn!("rejected request: {err}"),
        HandlerError::ExternalService(message) => {
            warn!("rekognition rejected the request: {message}")
        }
        HandlerError::Unexpected(cause) => error!("general error: {cause:#}"),
    }
    err.into()
}

/// Decode standard base64, tolerating line breaks and a `data:` URL prefix
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = match encoded.strip_prefix("data:") {
        Some(url) => url.split_once(";base64,").map_or(encoded, |(_, data)| data),
        None => encoded,
    };

    let data = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>();

    general_purpose::STANDARD.decode(data)
}

/// Round to two decimals, kept within [0, 100]
pub fn round_confidence(confidence: f32) -> f64 {
    let confidence = f64::from(confidence).clamp(0.0, 100.0);
    (confidence * 100.0).round() / 100.0
}

impl From<DetectedLabel> for Label {
    fn from(label: DetectedLabel) -> Label {
        Label {
            name: label.name,
            confidence: round_confidence(label.confidence),
        }
    }
}
