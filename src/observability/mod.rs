//! Observability: structured JSON logging, typed events and counters.
//!
//! ```ignore
//! use dataapi::observability::{Logger, Event, MetricsRegistry, log_event_with_fields};
//!
//! Logger::info("ITEM_UPDATED", &[("table", "orders-dev")]);
//! log_event_with_fields(Event::InstanceEvicted, &[("api", "orders")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields. Failure events log at WARN.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a high-volume event at TRACE
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(Severity::Trace, event.as_str(), fields);
}
