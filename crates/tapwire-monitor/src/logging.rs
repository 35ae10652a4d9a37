//! Tracing setup for the monitor.
//!
//! [`NoiseFilter`] drops events whose fields contain a denied substring,
//! so known-harmless chatter never reaches the output.

use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_NOISE: &[&str] = &["message port closed", "Receiving end does not exist"];

#[derive(Debug, Clone, Default)]
pub struct NoiseFilter {
    deny: Vec<String>,
}

impl NoiseFilter {
    pub fn new<I, S>(deny: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            deny: deny
                .into_iter()
                .map(|s| -> String { s.into() })
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_noise(&self, text: &str) -> bool {
        self.deny.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

impl<S: Subscriber> Layer<S> for NoiseFilter {
    fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
        if self.deny.is_empty() {
            return true;
        }
        let mut text = FieldText::default();
        event.record(&mut text);
        !self.is_noise(&text.0)
    }
}

/// All field values of an event, space separated
#[derive(Default)]
struct FieldText(String);

impl Visit for FieldText {
    fn record_str(&mut self, _field: &Field, value: &str) {
        self.0.push_str(value);
        self.0.push(' ');
    }

    fn record_debug(&mut self, _field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, "{:?} ", value);
    }
}

/// Install the global subscriber: `RUST_LOG` (default `info`), compact
/// output, and the noise filter.
pub fn init(noise: NoiseFilter) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper_util=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(noise)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for Counter {
        fn on_event(&self, _event: &Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn count_events(noise: NoiseFilter, emit: impl FnOnce()) -> usize {
        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry()
            .with(noise)
            .with(Counter(seen.clone()));
        tracing::subscriber::with_default(subscriber, emit);
        seen.load(Ordering::SeqCst)
    }

    #[test]
    fn test_denied_messages_are_dropped() {
        let seen = count_events(NoiseFilter::new(DEFAULT_NOISE.iter().copied()), || {
            tracing::warn!("The message port closed before a response was received");
            tracing::error!(
                "Could not establish connection. Receiving end does not exist."
            );
            tracing::info!("Traffic: 3 outgoing, 3 incoming");
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_fields_are_matched_too() {
        let seen = count_events(NoiseFilter::new(["flaky"]), || {
            let reason = "flaky extension";
            tracing::warn!(reason, "Request dropped");
            tracing::warn!(reason = "timeout", "Request dropped");
        });
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_empty_deny_list_passes_everything() {
        let filter = NoiseFilter::new(Vec::<String>::new());
        assert!(!filter.is_noise("anything"));
        let seen = count_events(NoiseFilter::new([""]), || {
            tracing::info!("one");
            tracing::info!("two");
        });
        assert_eq!(seen, 2);
    }
}
