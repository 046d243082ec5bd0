//! JSON progress events on stdout, one per line, for a supervising process.
//!
//! Event format:
//! - Start: {"event":"started","operationId":"<uuid>","status":"running","totalFiles":3}
//! - Progress: {"event":"progress","operationId":"<uuid>","percentComplete":<0-100>,"status":"running","message":"...","filesProcessed":1,"totalFiles":3}
//! - Complete: {"event":"complete","operationId":"<uuid>","success":true/false,"status":"completed/failed","message":"..."}

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ProgressEvent<'a> {
    Started {
        operation_id: &'a str,
        status: &'static str,
        total_files: usize,
    },
    Progress {
        operation_id: &'a str,
        percent_complete: f64,
        status: &'static str,
        message: String,
        files_processed: usize,
        total_files: usize,
    },
    Complete {
        operation_id: &'a str,
        success: bool,
        status: &'static str,
        message: &'a str,
    },
}

/// Emits progress events while log files are summarized. Safe to call from
/// several worker threads; each event is written as a single line.
pub struct ProgressReporter {
    operation_id: String,
    enabled: bool,
    total_files: usize,
    files_processed: AtomicUsize,
}

impl ProgressReporter {
    /// `enabled` follows the `--progress` flag; when false every emit is a no-op.
    pub fn new(enabled: bool, total_files: usize) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            enabled,
            total_files,
            files_processed: AtomicUsize::new(0),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn emit_started(&self) {
        self.emit(&ProgressEvent::Started {
            operation_id: &self.operation_id,
            status: "running",
            total_files: self.total_files,
        });
    }

    /// Record one finished file and emit the new percentage.
    pub fn file_finished(&self, message: String) {
        let files_processed = self.files_processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(&self.progress_event(files_processed, message));
    }

    pub fn emit_complete(&self, message: &str) {
        self.emit(&ProgressEvent::Complete {
            operation_id: &self.operation_id,
            success: true,
            status: "completed",
            message,
        });
    }

    pub fn emit_failed(&self, message: &str) {
        self.emit(&ProgressEvent::Complete {
            operation_id: &self.operation_id,
            success: false,
            status: "failed",
            message,
        });
    }

    fn progress_event(&self, files_processed: usize, message: String) -> ProgressEvent<'_> {
        let percent_complete = if self.total_files == 0 {
            100.0
        } else {
            files_processed as f64 * 100.0 / self.total_files as f64
        };

        ProgressEvent::Progress {
            operation_id: &self.operation_id,
            percent_complete: percent_complete.clamp(0.0, 100.0),
            status: "running",
            message,
            files_processed,
            total_files: self.total_files,
        }
    }

    fn emit(&self, event: &ProgressEvent<'_>) {
        if !self.enabled {
            return;
        }

        if let Ok(json) = serde_json::to_string(event) {
            println!("{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_progress_event_shape() {
        let reporter = ProgressReporter::new(true, 4);
        let event = reporter.progress_event(1, "access.log: 10 records".to_string());

        let json: Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "progress");
        assert_eq!(json["operationId"], reporter.operation_id());
        assert_eq!(json["percentComplete"], 25.0);
        assert_eq!(json["filesProcessed"], 1);
        assert_eq!(json["totalFiles"], 4);
        assert_eq!(json["message"], "access.log: 10 records");
    }

    #[test]
    fn test_started_and_complete_events() {
        let reporter = ProgressReporter::new(true, 2);

        let started = serde_json::to_value(ProgressEvent::Started {
            operation_id: reporter.operation_id(),
            status: "running",
            total_files: 2,
        })
        .unwrap();
        assert_eq!(started["event"], "started");
        assert_eq!(started["totalFiles"], 2);

        let failed = serde_json::to_value(ProgressEvent::Complete {
            operation_id: reporter.operation_id(),
            success: false,
            status: "failed",
            message: "boom",
        })
        .unwrap();
        assert_eq!(failed["event"], "complete");
        assert_eq!(failed["success"], false);
        assert_eq!(failed["status"], "failed");
    }

    #[test]
    fn test_counts_finished_files_across_threads() {
        let reporter = ProgressReporter::new(false, 8);
        std::thread::scope(|scope| {
            for i in 0..8 {
                let reporter = &reporter;
                scope.spawn(move || reporter.file_finished(format!("file {}", i)));
            }
        });
        assert_eq!(reporter.files_processed.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_no_files_is_complete() {
        let reporter = ProgressReporter::new(false, 0);
        let json = serde_json::to_value(reporter.progress_event(0, String::new())).unwrap();
        assert_eq!(json["percentComplete"], 100.0);
    }
}
