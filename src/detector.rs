//! The label detector is the single external collaborator of the handler. It
//! takes raw image bytes and returns labels already filtered by confidence and
//! capped in number by the service itself

use crate::config::{MAX_LABELS, MIN_CONFIDENCE};
use crate::settings::Settings;
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_rekognition::config::Region;
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::operation::detect_labels::DetectLabelsError;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::Image;
use aws_sdk_rekognition::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::*;

/// How the detector filters what it returns
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionPolicy {
    /// Minimum confidence, in percent
    pub min_confidence: f32,

    /// Maximum number of labels
    pub max_labels: i32,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            min_confidence: MIN_CONFIDENCE,
            max_labels: MAX_LABELS,
        }
    }
}

/// A label as reported by the detector, before any reshaping
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    /// The service received the request and rejected it
    #[error("{message}")]
    Service { message: String },

    /// The request never got a service answer: connection failure, timeout,
    /// unreadable response
    #[error("{0}")]
    Transport(String),
}

#[async_trait]
pub trait LabelDetector: Send + Sync {
    /// Detect labels in `image`. Order of the result is the service's order
    async fn detect_labels(
        &self,
        image: Vec<u8>,
        policy: DetectionPolicy,
    ) -> Result<Vec<DetectedLabel>, DetectError>;
}

/// Process-wide client, built on first use and never mutated afterwards
static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// `LabelDetector` backed by Amazon Rekognition `DetectLabels`
#[derive(Debug, Clone)]
pub struct RekognitionDetector {
    client: Client,
}

impl RekognitionDetector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// A detector over the process-wide client. The first caller's settings
    /// decide the region and timeout
    pub async fn shared(settings: &Settings) -> Self {
        let client = CLIENT
            .get_or_init(|| {
                build_client(
                    settings.region.clone(),
                    Duration::from_secs(settings.timeout_secs),
                )
            })
            .await;
        Self::new(client.clone())
    }
}

async fn build_client(region: Option<String>, timeout: Duration) -> Client {
    let timeouts = TimeoutConfig::builder().operation_timeout(timeout).build();
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
    if let Some(region) = region {
        loader = loader.region(Region::new(region));
    }
    let sdk_config = loader.load().await;

    info!(
        "rekognition client ready (region = {:?}, timeout = {:?})",
        sdk_config.region(),
        timeout
    );
    Client::new(&sdk_config)
}

#[async_trait]
impl LabelDetector for RekognitionDetector {
    #[tracing::instrument(skip(self, image), fields(bytes = image.len()))]
    async fn detect_labels(
        &self,
        image: Vec<u8>,
        policy: DetectionPolicy,
    ) -> Result<Vec<DetectedLabel>, DetectError> {
        let output = self
            .client
            .detect_labels()
            .image(Image::builder().bytes(Blob::new(image)).build())
            .min_confidence(policy.min_confidence)
            .max_labels(policy.max_labels)
            .send()
            .await?;

        let labels = output
            .labels()
            .iter()
            .map(|label| DetectedLabel {
                name: label.name().unwrap_or_default().to_string(),
                confidence: label.confidence().unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        debug!("rekognition returned {} labels", labels.len());
        Ok(labels)
    }
}

impl From<SdkError<DetectLabelsError>> for DetectError {
    fn from(err: SdkError<DetectLabelsError>) -> Self {
        match err.as_service_error() {
            Some(service) => DetectError::Service {
                message: service
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| service.to_string()),
            },
            None => DetectError::Transport(DisplayErrorContext(&err).to_string()),
        }
    }
}

/// Detector doubles for tests
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Returns canned labels and records every call
    #[derive(Default)]
    pub struct StubDetector {
        labels: Vec<DetectedLabel>,
        pub calls: Mutex<Vec<(Vec<u8>, DetectionPolicy)>>,
    }

    impl StubDetector {
        pub fn new(labels: &[(&str, f32)]) -> Self {
            Self {
                labels: labels
                    .iter()
                    .map(|(name, confidence)| DetectedLabel {
                        name: name.to_string(),
                        confidence: *confidence,
                    })
                    .collect(),
                calls: Mutex::new(vec![]),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LabelDetector for StubDetector {
        async fn detect_labels(
            &self,
            image: Vec<u8>,
            policy: DetectionPolicy,
        ) -> Result<Vec<DetectedLabel>, DetectError> {
            self.calls.lock().unwrap().push((image, policy));
            Ok(self.labels.clone())
        }
    }

    /// Fails every call with the given error
    pub struct FailingDetector(pub DetectError);

    #[async_trait]
    impl LabelDetector for FailingDetector {
        async fn detect_labels(
            &self,
            _image: Vec<u8>,
            _policy: DetectionPolicy,
        ) -> Result<Vec<DetectedLabel>, DetectError> {
            Err(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use aws_sdk_rekognition::config::retry::RetryConfig;
    use aws_sdk_rekognition::config::Credentials;
    use aws_sdk_rekognition::error::ErrorMetadata;
    use aws_sdk_rekognition::operation::detect_labels::DetectLabelsOutput;
    use aws_sdk_rekognition::types::error::InvalidImageFormatException;
    use aws_sdk_rekognition::types::Label;
    use aws_smithy_mocks::{mock, mock_client};

    #[test]
    fn test_default_policy() {
        let policy = DetectionPolicy::default();
        assert_eq!(policy.min_confidence, 70.0);
        assert_eq!(policy.max_labels, 10);
    }

    #[test]
    fn test_error_display() {
        let err = DetectError::Service {
            message: "Request has invalid image format".into(),
        };
        assert_eq!(err.to_string(), "Request has invalid image format");

        let err = DetectError::Transport("dispatch failure".into());
        assert_eq!(err.to_string(), "dispatch failure");
    }

    #[tokio::test]
    async fn test_rekognition_request_and_labels() {
        let rule = mock!(Client::detect_labels)
            .match_requests(|req| {
                req.min_confidence() == Some(70.0)
                    && req.max_labels() == Some(10)
                    && req
                        .image()
                        .and_then(|image| image.bytes())
                        .is_some_and(|bytes| bytes.clone().into_inner() == b"hello".to_vec())
            })
            .then_output(|| {
                DetectLabelsOutput::builder()
                    .labels(Label::builder().name("Bottle").confidence(91.234).build())
                    .labels(Label::builder().name("Plastic").confidence(75.5).build())
                    .build()
            });
        let client = mock_client!(aws_sdk_rekognition, [&rule]);

        let labels = RekognitionDetector::new(client)
            .detect_labels(b"hello".to_vec(), DetectionPolicy::default())
            .await
            .unwrap();

        assert_eq!(
            labels,
            vec![
                DetectedLabel {
                    name: "Bottle".into(),
                    confidence: 91.234
                },
                DetectedLabel {
                    name: "Plastic".into(),
                    confidence: 75.5
                },
            ]
        );
        assert_eq!(rule.num_calls(), 1);
    }

    #[tokio::test]
    async fn test_rekognition_service_error() {
        let rule = mock!(Client::detect_labels).then_error(|| {
            DetectLabelsError::InvalidImageFormatException(
                InvalidImageFormatException::builder()
                    .message("Request has invalid image format")
                    .meta(
                        ErrorMetadata::builder()
                            .code("InvalidImageFormatException")
                            .message("Request has invalid image format")
                            .build(),
                    )
                    .build(),
            )
        });
        let client = mock_client!(aws_sdk_rekognition, [&rule]);

        let err = RekognitionDetector::new(client)
            .detect_labels(vec![0; 16], DetectionPolicy::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            DetectError::Service {
                message: "Request has invalid image format".into()
            }
        );
        assert_eq!(
            HandlerError::from(err).to_string(),
            "Rekognition Client Error: Request has invalid image format"
        );
    }

    #[tokio::test]
    async fn test_rekognition_unreachable() {
        let config = aws_sdk_rekognition::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("akid", "secret", None, None, "test"))
            .endpoint_url("http://127.0.0.1:1")
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(5))
                    .build(),
            )
            .build();

        let err = RekognitionDetector::new(Client::from_conf(config))
            .detect_labels(vec![0; 16], DetectionPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, DetectError::Transport(_)), "{err:?}");
        assert!(HandlerError::from(err)
            .to_string()
            .starts_with("An unexpected error occurred: "));
    }
}
