//! Logging setup
//!
//! Installs a `tracing` subscriber writing to stderr, so stdout carries only
//! the suite report. The filter comes from the first source that is set:
//! `ACTVERIFY_LOG`, then `RUST_LOG`, then the level passed by the caller,
//! then `warn`.
//!
//! ```rust
//! use actverify_core::logging::{self, LogFormat, LogOptions};
//!
//! let options = LogOptions {
//!     format: Some(LogFormat::Text),
//!     level: Some("info".to_string()),
//! };
//! logging::init(&options).expect("logging");
//!
//! // Later calls keep the first subscriber
//! logging::init(&LogOptions::default()).expect("logging");
//! ```

use anyhow::{Context, Result};
use std::{env, io, sync::Once};
use tracing::{debug, warn};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives, taking precedence over `RUST_LOG`
pub const LOG_ENV: &str = "ACTVERIFY_LOG";
/// `json` selects JSON lines when the caller names no format
pub const LOG_FORMAT_ENV: &str = "ACTVERIFY_LOG_FORMAT";
/// Span lifecycle events to log, e.g. `new,close`
pub const SPAN_EVENTS_ENV: &str = "ACTVERIFY_LOG_SPAN_EVENTS";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Crates whose events a caller-supplied level applies to
const OWN_TARGETS: [&str; 2] = ["actverify", "actverify_core"];

static INIT: Once = Once::new();

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is text
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Caller preferences; environment variables fill in what is left unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub format: Option<LogFormat>,
    /// Level for the harness crates, such as `debug`
    pub level: Option<String>,
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(options: &LogOptions) -> Result<()> {
    let mut installed = Ok(());
    INIT.call_once(|| installed = install(options));
    installed
}

fn install(options: &LogOptions) -> Result<()> {
    let format = options
        .format
        .or_else(|| env::var(LOG_FORMAT_ENV).ok().map(|name| LogFormat::from_name(&name)))
        .unwrap_or_default();
    let (filter, rejected) = select_filter(
        env::var(LOG_ENV).ok().as_deref(),
        env::var("RUST_LOG").ok().as_deref(),
        options.level.as_deref(),
    );
    let span_events = select_span_events(env::var(SPAN_EVENTS_ENV).ok().as_deref(), format);

    let layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events)
        .with_writer(io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Text => registry.with(layer).try_init(),
    }
    .context("failed to install the tracing subscriber")?;

    if let Some(spec) = rejected {
        warn!("Invalid log filter '{}', using '{}'", spec, DEFAULT_DIRECTIVE);
    }
    debug!("Logging initialized with format {:?}", format);
    Ok(())
}

/// Build the filter from the first non-blank source.
///
/// A source that fails to parse falls back to the default directive and is
/// returned alongside so it can be reported once logging is up.
fn select_filter(
    actverify_log: Option<&str>,
    rust_log: Option<&str>,
    level: Option<&str>,
) -> (EnvFilter, Option<String>) {
    let from_level = level.map(|level| {
        OWN_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, level.trim()))
            .collect::<Vec<_>>()
            .join(",")
    });
    let spec = [actverify_log.map(str::to_string), rust_log.map(str::to_string), from_level]
        .into_iter()
        .flatten()
        .find(|spec| !spec.trim().is_empty());

    match spec {
        Some(spec) => match EnvFilter::try_new(&spec) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(DEFAULT_DIRECTIVE), Some(spec)),
        },
        None => (EnvFilter::new(DEFAULT_DIRECTIVE), None),
    }
}

/// Span events from a `,`/`|` separated list, or the format's default.
/// JSON logs record span open and close; text logs record none.
fn select_span_events(raw: Option<&str>, format: LogFormat) -> FmtSpan {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return match format {
            LogFormat::Json => FmtSpan::NEW | FmtSpan::CLOSE,
            LogFormat::Text => FmtSpan::NONE,
        };
    };

    raw.split([',', '|'])
        .map(|token| token.trim().to_ascii_lowercase())
        .fold(FmtSpan::NONE, |acc, token| {
            acc | match token.as_str() {
                "new" => FmtSpan::NEW,
                "close" => FmtSpan::CLOSE,
                "enter" => FmtSpan::ENTER,
                "exit" => FmtSpan::EXIT,
                "active" => FmtSpan::ACTIVE,
                "full" => FmtSpan::FULL,
                _ => FmtSpan::NONE,
            }
        })
}
