// In app/src/tracing_layer.rs

use chrono::Utc;
use events::{EventBus, LedgerEvent, LogLine};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

/// Forwards log events onto the event bus so WebSocket clients see them.
pub struct EventBusLayer {
    events: EventBus,
}

impl EventBusLayer {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

impl<S> Layer<S> for EventBusLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        // The bus logs about itself; forwarding those would loop.
        if event.metadata().target().starts_with("events") {
            return;
        }

        let mut visitor = LogMessageVisitor::default();
        event.record(&mut visitor);
        self.events.publish(LedgerEvent::Log(LogLine {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.finish(),
        }));
    }
}

/// Captures the `message` field and appends the other fields as `key=value`.
#[derive(Default)]
struct LogMessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl LogMessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl tracing::field::Visit for LogMessageVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[tokio::test]
    async fn warnings_reach_the_bus() {
        let events = EventBus::new(16);
        let mut rx = events.subscribe();
        let subscriber = tracing_subscriber::registry().with(EventBusLayer::new(events));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(symbol = "ACME", "Price feed degraded.");
        });

        match rx.recv().await.unwrap() {
            LedgerEvent::Log(line) => {
                assert_eq!(line.level, "WARN");
                assert_eq!(line.message, "Price feed degraded. symbol=ACME");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
