#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Per-call diagnostic trail returned in the response `log` field.

use chrono::{SecondsFormat, Utc};
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_STDERR_FILTER: &str = "warn";

#[derive(Debug, Clone, Default)]
pub struct CallLog {
    buffer: Arc<Mutex<String>>,
}

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the buffer.
    #[must_use]
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Subscriber that records INFO and above into this log and mirrors
    /// events to stderr under `RUST_LOG`.
    #[must_use]
    pub fn dispatch(&self) -> Dispatch {
        let stderr_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDERR_FILTER));
        let subscriber = tracing_subscriber::registry()
            .with(
                CaptureLayer {
                    buffer: Arc::clone(&self.buffer),
                }
                .with_filter(LevelFilter::INFO),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(stderr_filter),
            );
        Dispatch::new(subscriber)
    }
}

struct CaptureLayer {
    buffer: Arc<Mutex<String>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = render_line(*event.metadata().level(), &visitor);

        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(&line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

fn render_line(level: Level, visitor: &LineVisitor) -> String {
    format!(
        "{} {} {}{}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        level,
        visitor.message,
        visitor.fields
    )
}

#[cfg(test)]
mod tests {
    use super::CallLog;
    use tracing::{debug, error, info};

    #[test]
    fn given_events_at_several_levels_when_captured_then_info_and_above_are_kept() {
        let log = CallLog::new();

        tracing::dispatcher::with_default(&log.dispatch(), || {
            debug!("hidden detail");
            info!(vm_id = "vm-1", "Starting VM");
            error!("Detach failed");
        });

        let contents = log.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" INFO Starting VM vm_id=vm-1"));
        assert!(lines[1].ends_with(" ERROR Detach failed"));
        assert!(!contents.contains("hidden detail"));
    }

    #[test]
    fn take_drains_the_buffer() {
        let log = CallLog::new();
        tracing::dispatcher::with_default(&log.dispatch(), || info!("once"));

        assert!(log.take().contains("once"));
        assert!(log.contents().is_empty());
    }
}
