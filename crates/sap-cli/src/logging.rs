//! Console diagnostics.
//!
//! Everything goes to stderr with a coloured severity tag. Records from
//! libraries using the `log` crate are bridged into the same subscriber.

use std::fmt;

use colored::{ColoredString, Colorize};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Show info and warning diagnostics, not only errors.
    pub verbose: bool,
}

impl LogConfig {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Get the filter directive.
    pub const fn directive(self) -> &'static str {
        if self.verbose {
            "info"
        } else {
            "error"
        }
    }

    /// Build the console filter. The environment is not consulted.
    pub fn filter(self) -> EnvFilter {
        EnvFilter::new(self.directive())
    }

    /// Install the global subscriber.
    pub fn init(self) {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(SeverityFormat)
                    .with_writer(std::io::stderr),
            )
            .with(self.filter())
            .init();
    }
}

/// Formats events as `TAG: message`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeverityFormat;

impl<S, N> FormatEvent<S, N> for SeverityFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} ", severity_tag(*event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Get the coloured tag for a level.
pub fn severity_tag(level: Level) -> ColoredString {
    match level {
        Level::ERROR => "ERROR:".red(),
        Level::WARN => "WARNING:".yellow(),
        Level::INFO => "INFO:".blue(),
        _ => "LOG:".green(),
    }
}
