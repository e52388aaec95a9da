use super::WebError;
use crate::handler::Handler;
use crate::protocol::RequestEnvelope;
use actix_web::{get, options, post, web, HttpResponse, Responder};
use anyhow::anyhow;
use serde_json::json;
use tracing::*;

type Result<T> = std::result::Result<T, WebError>;

/// Register every route of the host
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(hello)
        .service(hello_preflight)
        .service(invoke)
        .service(health);
}

/// Gateway-style route: the raw body becomes the envelope's `body`, and the
/// response envelope is rendered as the HTTP response
#[post("/hello")]
pub async fn hello(payload: web::Bytes, handler: web::Data<Handler>) -> impl Responder {
    let body = match String::from_utf8(payload.to_vec()) {
        Ok(body) => body,
        Err(e) => return handler.unexpected(anyhow!("request body is not UTF-8: {e}")),
    };

    // gateways pass `null` for an empty body
    let event = RequestEnvelope {
        body: (!body.is_empty()).then_some(body),
    };
    handler.handle(&event).await
}

/// CORS preflight for browsers posting JSON to `/hello`
#[options("/hello")]
pub async fn hello_preflight() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header(("Access-Control-Allow-Origin", "*"))
        .insert_header(("Access-Control-Allow-Methods", "POST, OPTIONS"))
        .insert_header(("Access-Control-Allow-Headers", "Content-Type"))
        .finish()
}

/// Function-invoke style route: takes a whole request envelope and returns
/// the response envelope as JSON
#[post("/invoke")]
pub async fn invoke(payload: web::Bytes, handler: web::Data<Handler>) -> Result<impl Responder> {
    let event: RequestEnvelope = serde_json::from_slice(&payload).map_err(|e| {
        debug!("rejected invoke payload: {e}");
        WebError::bad_request(anyhow!("invalid request envelope: {e}"))
    })?;

    Ok(web::Json(handler.handle(&event).await))
}

#[get("/health")]
pub async fn health() -> impl Responder {
    web::Json(json!({ "status": "ok" }))
}
