//! Progress reporting for document loading.

use std::sync::Arc;
use std::time::Instant;

/// Progress event emitted while loading documents.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Phase of the operation: "read", "reset", "index"
    pub phase: String,

    /// Documents handled so far
    pub current: u64,

    /// Total expected documents, when known
    pub total: Option<u64>,

    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: impl Into<String>,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase: phase.into(),
            current,
            total,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    /// Percentage complete, when the total is known and non-zero.
    pub fn percentage(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| (self.current as f64 / t as f64) * 100.0)
    }

    /// Format as a single user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };
        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits events through an optional callback and always logs them.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that only logs.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, mut event: ProgressEvent) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        event.elapsed_secs = Some(elapsed);

        tracing::info!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            elapsed_secs = elapsed,
            "{}",
            event.message
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn read(&self, records: u64, path: &str) {
        self.emit(ProgressEvent::new(
            "read",
            records,
            Some(records),
            format!("parsed {}", path),
        ));
    }

    pub fn reset(&self, collection: &str) {
        self.emit(ProgressEvent::new(
            "reset",
            0,
            None,
            format!("dropped collection '{}'", collection),
        ));
    }

    pub fn index(&self, current: u64, total: u64, batch: usize) {
        self.emit(ProgressEvent::new(
            "index",
            current,
            Some(total),
            format!("upserted batch of {}", batch),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_event_format() {
        let event = ProgressEvent::new("index", 50, Some(200), "upserted batch of 50");
        let formatted = event.format_simple();
        assert_eq!(formatted, "[index] 50/200 (25%) - upserted batch of 50");
    }

    #[test]
    fn test_unknown_total_has_no_percentage() {
        let event = ProgressEvent::new("reset", 0, None, "dropped");
        assert_eq!(event.percentage(), None);
        assert_eq!(event.format_simple(), "[reset] 0 - dropped");
    }

    #[test]
    fn test_reporter_invokes_callback() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let reporter = ProgressReporter::new(Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        }));

        reporter.index(10, 20, 10);

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].phase, "index");
        assert!(captured[0].elapsed_secs.is_some());
    }

    #[test]
    fn test_noop_reporter() {
        ProgressReporter::noop().read(1, "docs.jsonl");
    }
}
