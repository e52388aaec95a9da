use actix_web::{middleware, web, App, HttpServer};
use ecolens::detector::RekognitionDetector;
use ecolens::handler::Handler;
use ecolens::server::routes;
use ecolens::settings::Settings;
use ecolens::util::init_tracing;
use std::sync::Arc;

use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    // One client for the whole process, shared by every worker
    let detector = RekognitionDetector::shared(&settings).await;
    let handler = web::Data::new(Handler::new(Arc::new(detector), settings.policy()));
    let max_body_bytes = settings.max_body_bytes;

    info!(
        "listening on {}:{} (policy = {:?})",
        settings.host,
        settings.port,
        handler.policy()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(handler.clone())
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
