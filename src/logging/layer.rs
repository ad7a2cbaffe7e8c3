//! `tracing` layer that feeds the batching logger.

use chrono::{DateTime, FixedOffset, Local};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::logging::batching::{BatchingLogger, LogMessage};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// Formats every event as one line and hands it to a [`BatchingLogger`].
///
/// Enqueueing never blocks; events arriving while the queue is full are
/// counted as dropped by the logger.
#[derive(Clone)]
pub struct BatchingLayer {
    logger: BatchingLogger,
}

impl BatchingLayer {
    pub fn new(logger: BatchingLogger) -> Self {
        Self { logger }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

/// `<timestamp> [<LEVEL>] <target>: <message> <fields>`
pub fn format_line(
    timestamp: &DateTime<FixedOffset>,
    level: &Level,
    target: &str,
    message: &str,
    fields: &str,
) -> String {
    let mut line = format!(
        "{} [{}] {}: {}",
        timestamp.format(TIMESTAMP_FORMAT),
        level,
        target,
        message
    );
    if !fields.is_empty() {
        line.push(' ');
        line.push_str(fields);
    }
    line
}

impl<S: Subscriber> Layer<S> for BatchingLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let timestamp = Local::now().fixed_offset();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let text = format_line(
            &timestamp,
            meta.level(),
            meta.target(),
            &visitor.message,
            &visitor.fields,
        );
        self.logger.try_enqueue(LogMessage::at(timestamp, text));
    }
}
