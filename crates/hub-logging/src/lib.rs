use std::fmt;
use std::str::FromStr;

use anstream::ColorChoice;
use jiff::Timestamp;
use owo_colors::OwoColorize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{Directive, FromEnvError};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Suppress all tracing output by default (overridable by `RUST_LOG`).
    #[default]
    Default,
    /// Show debug messages from the hub crates by default (overridable by `RUST_LOG`).
    Verbose,
    /// Like [`Level::Verbose`], with timestamps and the enclosing spans of each message.
    ExtraVerbose,
}

/// The style of a hub logging line.
pub struct HubFormat {
    pub display_timestamp: bool,
    pub display_level: bool,
    pub show_spans: bool,
}

impl Default for HubFormat {
    /// Regardless of the tracing level, show messages without any adornment.
    fn default() -> Self {
        Self {
            display_timestamp: false,
            display_level: true,
            show_spans: false,
        }
    }
}

/// See <https://docs.rs/tracing-subscriber/0.3.18/src/tracing_subscriber/fmt/format/mod.rs.html#1026-1156>
impl<S, N> FormatEvent<S, N> for HubFormat
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
        let meta = event.metadata();
        let ansi = writer.has_ansi_escapes();

        if self.display_timestamp {
            if ansi {
                write!(writer, "{} ", Timestamp::now().dimmed())?;
            } else {
                write!(writer, "{} ", Timestamp::now())?;
            }
        }

        if self.display_level {
            let level = meta.level();
            // Same colors as tracing
            if ansi {
                match *level {
                    tracing::Level::TRACE => write!(writer, "{} ", level.purple())?,
                    tracing::Level::DEBUG => write!(writer, "{} ", level.blue())?,
                    tracing::Level::INFO => write!(writer, "{} ", level.green())?,
                    tracing::Level::WARN => write!(writer, "{} ", level.yellow())?,
                    tracing::Level::ERROR => write!(writer, "{} ", level.red())?,
                }
            } else {
                write!(writer, "{level} ")?;
            }
        }

        if self.show_spans {
            let span = event.parent();
            let mut seen = false;

            let span = span
                .and_then(|id| ctx.span(id))
                .or_else(|| ctx.lookup_current());

            let scope = span.into_iter().flat_map(|span| span.scope().from_root());

            for span in scope {
                seen = true;
                if ansi {
                    write!(writer, "{}:", span.metadata().name().bold())?;
                } else {
                    write!(writer, "{}:", span.metadata().name())?;
                }
            }

            if seen {
                writer.write_char(' ')?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[derive(Debug, Error)]
pub enum SetupLoggingError {
    #[error("Invalid RUST_LOG directives")]
    Filter(#[source] FromEnvError),
    #[error("A global tracing subscriber is already installed")]
    Init(#[source] TryInitError),
}

/// The filter a [`Level`] starts from before `RUST_LOG` is applied.
fn default_directive(level: Level) -> Directive {
    match level {
        // Show nothing, but allow `RUST_LOG` to override.
        Level::Default => LevelFilter::OFF.into(),
        // Show `DEBUG` messages from the `hub_*` crates, which share the `hub` target prefix.
        Level::Verbose | Level::ExtraVerbose => Directive::from_str("hub=debug")
            .unwrap_or_else(|_| LevelFilter::DEBUG.into()),
    }
}

/// Configure `tracing` based on the given [`Level`], taking into account the `RUST_LOG` environment
/// variable.
///
/// Messages go to stderr, colored when stderr supports it. [`Level::ExtraVerbose`] adds
/// timestamps and span names to every line.
pub fn setup_logging(level: Level) -> Result<(), SetupLoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive(level))
        .from_env()
        .map_err(SetupLoggingError::Filter)?;

    let format = HubFormat {
        display_timestamp: level == Level::ExtraVerbose,
        display_level: true,
        show_spans: level == Level::ExtraVerbose,
    };
    let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Never | ColorChoice::Auto => false,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(format)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_filter(filter),
        )
        .try_init()
        .map_err(SetupLoggingError::Init)
}
