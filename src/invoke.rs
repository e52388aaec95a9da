//! Entrypoint to run a single invocation locally: reads a request envelope
//! and prints the response envelope

use anyhow::{bail, Context, Result};
use ecolens::detector::RekognitionDetector;
use ecolens::handler::Handler;
use ecolens::protocol::RequestEnvelope;
use ecolens::settings::Settings;
use ecolens::util::init_tracing;
use std::sync::Arc;
use std::{env, fs, io};

const USAGE: &str = "usage: ./ecolens-invoke [event file] (reads stdin without one)";

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    let args: Vec<String> = env::args().collect();
    let raw = match args.len() - 1 {
        0 => io::read_to_string(io::stdin()).context("failed to read event from stdin")?,
        1 => fs::read_to_string(&args[1])
            .with_context(|| format!("failed to read event file {}", args[1]))?,
        _ => bail!("{USAGE}"),
    };

    let event: RequestEnvelope =
        serde_json::from_str(&raw).context("event is not a request envelope")?;

    let detector = RekognitionDetector::shared(&settings).await;
    let handler = Handler::new(Arc::new(detector), settings.policy());
    let response = handler.handle(&event).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
