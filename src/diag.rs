//! Structured observability channel. The build emits named events to a
//! caller-supplied sink instead of logging ad hoc; the default sink drops
//! everything.

/// One diagnostic event from a build stage.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosticEvent<'a> {
    /// Pipeline stage that emitted the event ("march", "refine", ...).
    pub stage: &'a str,
    /// Event name within the stage ("split_cap", "sample_miss", ...).
    pub name: &'a str,
    /// How many times the condition occurred.
    pub count: usize,
    /// True when a hard cap or guard fired (as opposed to a plain counter).
    pub threshold_hit: bool,
}

/// Caller-supplied event sink. Must be shareable across worker threads.
pub trait DiagnosticSink: Sync {
    fn event(&self, event: &DiagnosticEvent);
}

/// Default sink: diagnostics disabled.
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn event(&self, _event: &DiagnosticEvent) {}
}

/// Sink that forwards events to the `log` facade. Cap hits are warnings,
/// plain counters are debug output.
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn event(&self, event: &DiagnosticEvent) {
        if event.threshold_hit {
            log::warn!(
                "{}: {} (count={})",
                event.stage,
                event.name,
                event.count
            );
        } else {
            log::debug!(
                "{}: {} (count={})",
                event.stage,
                event.name,
                event.count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test sink collecting (stage, name, threshold_hit) tuples.
    pub struct CollectSink(pub Mutex<Vec<(String, String, bool)>>);

    impl CollectSink {
        pub fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
    }

    impl DiagnosticSink for CollectSink {
        fn event(&self, event: &DiagnosticEvent) {
            self.0.lock().unwrap().push((
                event.stage.to_string(),
                event.name.to_string(),
                event.threshold_hit,
            ));
        }
    }

    #[test]
    fn null_sink_swallows_events() {
        let sink = NullSink;
        sink.event(&DiagnosticEvent {
            stage: "refine",
            name: "split_cap",
            count: 3,
            threshold_hit: true,
        });
    }

    #[test]
    fn collect_sink_records_events() {
        let sink = CollectSink::new();
        sink.event(&DiagnosticEvent {
            stage: "decimate",
            name: "sample_miss",
            count: 1,
            threshold_hit: false,
        });
        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "decimate");
        assert!(!events[0].2);
    }
}
