//! Colorized log output keyed by event target.
//!
//! [`SourceColorize`] is a `tracing-subscriber` event formatter that styles
//! each event's message by where the event came from: a [`Palette`] maps
//! target prefixes to [`Style`]s and the longest matching prefix wins, so a
//! noisy dependency can be dimmed while the application's own logs stand
//! out.
//!
//! ```no_run
//! use settings_kit::{logging, Color, Palette, Style};
//!
//! let palette = Palette::new()
//!     .rule("sqlx", Style::fg(Color::Magenta))
//!     .rule("app", Style::fg(Color::BrightGreen).bold());
//! logging::try_init(palette).ok();
//! ```

use std::fmt;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod palette;

pub use palette::{Color, Palette, ParseStyleError, Style};
pub use tracing_subscriber::util::TryInitError;

/// Event formatter that paints messages by their target's palette rule.
///
/// Lines render as `timestamp LEVEL target: message`, with the message
/// wrapped in the matched rule's escape sequence. Events with no matching
/// rule render unstyled.
#[derive(Debug, Clone)]
pub struct SourceColorize {
    palette: Palette,
    ansi: bool,
    timer: SystemTime,
}

impl SourceColorize {
    pub fn new(palette: Palette) -> Self {
        Self {
            palette,
            ansi: true,
            timer: SystemTime,
        }
    }

    /// Enables or disables escape sequences (on by default). Disable when
    /// the output is not a terminal.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

impl<S, N> FormatEvent<S, N> for SourceColorize
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;

        let meta = event.metadata();
        write!(writer, " {:>5} {}: ", meta.level(), meta.target())?;

        let mut message = String::new();
        ctx.format_fields(format::Writer::new(&mut message), event)?;

        match self.palette.style_for(meta.target()) {
            Some(style) if self.ansi => writeln!(writer, "{}", style.paint(&message)),
            _ => writeln!(writer, "{message}"),
        }
    }
}

/// Installs a global subscriber rendering events through [`SourceColorize`],
/// filtered from the `RUST_LOG` environment variable.
///
/// An already-installed global subscriber is reported as an error, not a
/// panic, so hosts that set up logging elsewhere can ignore it.
pub fn try_init(palette: Palette) -> Result<(), TryInitError> {
    tracing_subscriber::fmt()
        .event_format(SourceColorize::new(palette))
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init()
}
