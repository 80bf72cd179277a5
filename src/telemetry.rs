use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` overrides the default filter
/// and `RUST_LOG_FORMAT=json` switches to flattened JSON lines.
pub fn init_telemetry() {
    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    // Keep sqlx statement logging quiet unless asked for.
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,usm_retention=info,sqlx=warn".into()),
    );

    let registry = tracing_subscriber::registry().with(env_filter);

    // Logs go to stderr so command output on stdout stays clean.
    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(fmt_layer).init();
    }
}
