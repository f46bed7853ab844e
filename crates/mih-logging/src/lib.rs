use std::fmt;

use jiff::Timestamp;
use owo_colors::OwoColorize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// The name that prefixes every message that isn't plain progress information.
pub const LOGGER_NAME: &str = "maturin_import_hook";

/// The style of an import hook logging line.
///
/// `INFO` messages, such as `building "my_project"`, are shown without any adornment. Other
/// levels are prefixed with the logger name and the level, e.g.
/// `maturin_import_hook [WARN] build of "my_project" succeeded with warnings`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HookFormat {
    pub display_timestamp: bool,
}

impl HookFormat {
    #[must_use]
    pub fn with_timestamp(mut self, display_timestamp: bool) -> Self {
        self.display_timestamp = display_timestamp;
        self
    }
}

/// See <https://docs.rs/tracing-subscriber/0.3.18/src/tracing_subscriber/fmt/format/mod.rs.html#1026-1156>
impl<S, N> FormatEvent<S, N> for HookFormat
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
        let level = *event.metadata().level();
        let ansi = writer.has_ansi_escapes();

        if self.display_timestamp {
            if ansi {
                write!(writer, "{} ", Timestamp::now().dimmed())?;
            } else {
                write!(writer, "{} ", Timestamp::now())?;
            }
        }

        if level != Level::INFO {
            if ansi {
                write!(writer, "{} ", LOGGER_NAME.bold())?;
                // Same colors as tracing
                match level {
                    Level::TRACE => write!(writer, "[{}] ", level.purple())?,
                    Level::DEBUG => write!(writer, "[{}] ", level.blue())?,
                    Level::INFO => write!(writer, "[{}] ", level.green())?,
                    Level::WARN => write!(writer, "[{}] ", level.yellow())?,
                    Level::ERROR => write!(writer, "[{}] ", level.red())?,
                }
            } else {
                write!(writer, "{LOGGER_NAME} [{level}] ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}
