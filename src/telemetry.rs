//! Tracing setup for the host binary.
//!
//! `LOG_LEVEL` takes EnvFilter directives, e.g. `debug` or
//! `info,vocab_tutor::critique=trace`. Core modules log under their module
//! paths (`vocab_tutor::tasks::exam`, `vocab_tutor::extract`, ...), so the
//! default `vocab_tutor=debug` directive covers the whole tutoring core.
//! `LOG_FORMAT=json` switches to one JSON object per line.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,vocab_tutor=debug,tower_http=info,axum=info";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// Anything other than `json` (any case) means pretty output.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Filter from `directives`, or the default when they are missing or invalid.
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let filter = filter_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
