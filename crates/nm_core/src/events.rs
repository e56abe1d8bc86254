use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Non-fatal pipeline events. They never abort a cycle but must reach a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    ProviderFetchFailed { provider: String, reason: String },
    ClassifierFailed { classifier: String, url: String, reason: String },
    StoreWriteFailed { url: String, reason: String },
}

impl fmt::Display for IngestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderFetchFailed { provider, reason } => {
                write!(f, "provider {} failed: {}", provider, reason)
            }
            Self::ClassifierFailed { classifier, url, reason } => {
                write!(f, "{} classifier failed for {}: {}", classifier, url, reason)
            }
            Self::StoreWriteFailed { url, reason } => write!(f, "could not store {}: {}", url, reason),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: IngestEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<IngestEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: IngestEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn event(url: &str) -> IngestEvent {
        IngestEvent::StoreWriteFailed {
            url: url.to_string(),
            reason: "disk full".to_string(),
        }
    }

    #[test]
    fn test_memory_sink_keeps_events_after_a_panicking_writer() {
        let sink = Arc::new(MemorySink::new());
        sink.record(event("https://a.test"));

        let poisoner = sink.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("writer died");
        })
        .join();
        assert!(sink.events.is_poisoned());

        sink.record(event("https://b.test"));
        assert_eq!(sink.events(), vec![event("https://a.test"), event("https://b.test")]);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(event("https://a.test").to_string(), "could not store https://a.test: disk full");
    }
}
