//! Wire types of a single invocation: the request envelope handed over by the
//! gateway, the JSON payload inside its body, and the response envelope

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";

/// The event a function invocation receives. Gateways attach many more
/// fields (path, headers, request context); only `body` is read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// JSON-encoded `ImagePayload`. `None` when the client sent no body
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestEnvelope {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
        }
    }
}

/// The JSON document carried in `RequestEnvelope::body`
pub struct ImagePayload {
    /// `None` when `base64Image` is absent or falsy (`null`, `""`, `0`,
    /// `false`, `[]`, `{}`)
    pub base64_image: Option<String>,
}

impl ImagePayload {
    /// Parse a request body. The body must be a JSON object; a truthy
    /// `base64Image` must be a string
    pub fn parse(body: &str) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        let Value::Object(mut fields) = value else {
            bail!("request body is not a JSON object");
        };

        let base64_image = match fields.remove("base64Image") {
            None => None,
            Some(value) if is_falsy(&value) => None,
            Some(Value::String(s)) => Some(s),
            Some(value) => bail!("'base64Image' must be a string, got {value}"),
        };

        Ok(Self { base64_image })
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

impl Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ImagePayload {{ base64Image: <{} chars> }}",
            self.base64_image.as_ref().map_or(0, String::len)
        )
    }
}

/// A label as it appears in the response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Label {
    pub name: String,
    pub confidence: f64,
}

/// Body of a successful analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBody {
    pub message: String,
    pub labels: Vec<Label>,
    pub input_size_bytes: usize,
}

/// Body of every failed invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// What an invocation returns to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded `AnalysisBody` or `ErrorBody`
    pub body: String,
}

impl ResponseEnvelope {
    /// A JSON response open to any origin
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|e| {
            // plain structs of strings and numbers; not expected to happen
            format!(r#"{{"error":"failed to encode response body: {e}"}}"#)
        });

        let headers = BTreeMap::from([
            (CONTENT_TYPE.to_string(), "application/json".to_string()),
            (ALLOW_ORIGIN.to_string(), "*".to_string()),
        ]);

        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
