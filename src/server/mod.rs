//! The HTTP host that stands in for the API gateway: it turns HTTP requests
//! into request envelopes and response envelopes back into HTTP responses

use crate::protocol::ResponseEnvelope;
use actix_web::body::BoxBody;
use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, Responder};
use std::collections::HashMap;
use tracing::warn;

pub mod routes;

/// A failure of the host itself, not of an invocation
#[derive(Debug)]
pub struct WebError {
    err: anyhow::Error,
    status: StatusCode,
}

impl WebError {
    pub fn bad_request(err: anyhow::Error) -> Self {
        WebError {
            err,
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.err)
    }
}

impl actix_web::error::ResponseError for WebError {
    fn error_response(&self) -> HttpResponse {
        let err = HashMap::from([("errors", vec![self.to_string()])]);

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(err)
    }

    fn status_code(&self) -> StatusCode {
        self.status
    }
}

/// Copy status, headers and body of the envelope onto the HTTP response
impl Responder for ResponseEnvelope {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        let status = StatusCode::from_u16(self.status_code).unwrap_or_else(|_| {
            warn!("handler produced invalid status {}", self.status_code);
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut res = HttpResponse::build(status);
        for (name, value) in &self.headers {
            res.insert_header((name.as_str(), value.as_str()));
        }
        res.body(self.body)
    }
}
