pub mod detector;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod settings;

/// EcoLens configuration defaults. Every value here can be overridden per
/// deployment through `settings::Settings`, never per request
pub mod config {
    /// Labels below this confidence (percent) are dropped by the detector
    pub const MIN_CONFIDENCE: f32 = 70.0;

    /// Upper bound on the number of labels returned for one image
    pub const MAX_LABELS: i32 = 10;

    /// Config file read at start-up when `ECOLENS_CONFIG` is not set
    pub const DEFAULT_CONFIG_FILE: &str = "ecolens.toml";

    /// Prefix of the environment variables that override settings
    pub const ENV_PREFIX: &str = "ECOLENS";

    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 3000;

    /// Default tracing directive
    pub const RUST_LOG: &str = "info,actix_web=info";

    /// Operation timeout handed to the AWS SDK, in seconds
    pub const TIMEOUT_SECS: u64 = 10;

    /// Largest request body the HTTP host accepts. A 5 MB image is ~6.7 MB
    /// once base64 encoded
    pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
}

/// Process-level helpers shared by both binaries
pub mod util {
    use tracing_subscriber::EnvFilter;

    /// Install the global tracing subscriber. `RUST_LOG` wins over the
    /// configured directive. Output goes to stderr so `ecolens-invoke` can
    /// print the response envelope on stdout
    pub fn init_tracing(directive: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
