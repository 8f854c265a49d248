use anyhow::{Context, Result};
use chrono::Local;
use std::{
    fs::File,
    io::{self, IsTerminal},
    path::Path,
    sync::Mutex,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        FmtContext,
        format::{FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

const AUDIT_TARGET: &str = "tax_audit";
const DEFAULT_LEVEL: &str = "info";

// --- Formatter ---

/// One line per event: local timestamp, level, `file:line`, fields.
/// Audit events are tagged so they can be grepped out of a mixed log.
struct CliFmt;

impl<S, N> FormatEvent<S, N> for CliFmt
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let ansi = writer.has_ansi_escapes();
        let paint = |code: &'static str| if ansi { code } else { "" };
        let reset = paint("\x1b[0m");

        write!(
            writer,
            "{}{}{reset} ",
            paint("\x1b[2m"),
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )?;
        write!(writer, "{}{:>5}{reset} ", paint(level_color(meta.level())), meta.level())?;

        if meta.target() == AUDIT_TARGET {
            write!(writer, "{}audit{reset} ", paint("\x1b[1;36m"))?;
        } else if let (Some(file), Some(line)) = (meta.file(), meta.line()) {
            write!(writer, "{}{}:{line}{reset} ", paint("\x1b[36m"), short_path(file))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "\x1b[1;31m",
        Level::WARN => "\x1b[1;33m",
        Level::INFO => "\x1b[1;32m",
        Level::DEBUG => "\x1b[1;34m",
        Level::TRACE => "\x1b[1;35m",
    }
}

/// `tax-core/src/pipeline.rs` -> `tax-core/pipeline.rs`; `src/main.rs` -> `main.rs`.
fn short_path(file: &str) -> String {
    let file = file.replace('\\', "/");
    match file.strip_prefix("src/") {
        Some(rest) => rest.to_string(),
        None => file.replacen("/src/", "/", 1),
    }
}

// --- Filter ---

/// Picks the filter directive: an explicit `--log-level` wins, then
/// `RUST_LOG`, then the configured level.
fn filter_directive(
    explicit: Option<&str>,
    env: Option<String>,
    configured: Option<&str>,
) -> String {
    explicit
        .map(str::to_string)
        .or(env.filter(|v| !v.trim().is_empty()))
        .or(configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

fn make_filter(
    explicit: Option<&str>,
    configured: Option<&str>,
) -> Result<EnvFilter> {
    let directive = filter_directive(
        explicit,
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        configured,
    );
    EnvFilter::try_new(&directive).with_context(|| format!("invalid log level '{directive}'"))
}

// --- Public API ---

/// Initializes logging. Call once at startup.
///
/// - Stderr: colored when attached to a terminal; stdout is left for results.
/// - File: appended to when `file` is given, never colored.
/// - Level: `explicit`, else `RUST_LOG`, else `configured`, else INFO.
pub fn init_logging(
    explicit: Option<&str>,
    configured: Option<&str>,
    file: Option<&Path>,
) -> Result<()> {
    let filter = make_filter(explicit, configured)?;

    let file_layer = match file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file '{}'", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .event_format(CliFmt)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .event_format(CliFmt)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("logging already initialized")
}
