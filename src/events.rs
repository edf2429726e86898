use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

const MAX_EVENTS: usize = 100;

// Extraction response time thresholds, seconds
const API_BASELINE_RESPONSE: f64 = 1.2;
const API_SLOW_THRESHOLD: f64 = 3.0;
const API_VERY_SLOW_THRESHOLD: f64 = 8.0;
const HEALTH_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BatchStarted,
    BatchComplete,
    ApiDegraded,
    ApiRecovered,
    ApiSlow,
    ApiTimeout,
    ApiError,
    ProcessingStopped,
    Cleared,
    SystemError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventFile {
    events: Vec<Event>,
}

/// Newest-first rolling log of operational events, optionally mirrored to JSON.
pub struct EventLog {
    path: Option<PathBuf>,
    events: Vec<Event>,
}

impl EventLog {
    /// Open the log at `path`. An unreadable or corrupt file starts a fresh log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let events = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<EventFile>(&raw).ok())
            .map(|file| file.events)
            .unwrap_or_default();
        Self {
            path: Some(path),
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn latest(&self) -> Option<&Event> {
        self.events.first()
    }

    pub fn emit(&mut self, kind: EventKind, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.events.insert(
            0,
            Event {
                timestamp: Utc::now(),
                kind,
                message: message.into(),
                details,
            },
        );
        self.events.truncate(MAX_EVENTS);
        self.save();
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else { return };
        let file = EventFile {
            events: self.events.clone(),
        };
        let result = path
            .parent()
            .map(fs::create_dir_all)
            .transpose()
            .and_then(|_| {
                let body = serde_json::to_string_pretty(&file)?;
                fs::write(path, body)
            });
        if let Err(e) = result {
            warn!("Failed to write events to {}: {}", path.display(), e);
        }
    }

    pub fn batch_started(&mut self, app_count: usize) {
        self.emit(
            EventKind::BatchStarted,
            format!("Processing started: {} applications queued", app_count),
            Some(json!({ "app_count": app_count })),
        );
    }

    pub fn batch_complete(&mut self, app_count: usize, duration_seconds: f64, errors: usize) {
        if app_count == 0 {
            self.emit(EventKind::BatchComplete, "Batch complete: no applications to process", None);
            return;
        }
        let average = duration_seconds / app_count as f64;
        let mut message = format!(
            "Batch complete: {} apps in {} ({:.1}s/app)",
            app_count,
            format_duration(duration_seconds),
            average
        );
        if errors > 0 {
            message.push_str(&format!(", {} errors", errors));
        }
        self.emit(
            EventKind::BatchComplete,
            message,
            Some(json!({
                "app_count": app_count,
                "duration_seconds": round1(duration_seconds),
                "avg_seconds_per_app": round1(average),
                "errors": errors,
            })),
        );
    }

    pub fn api_timeout(&mut self, error: &str) {
        self.emit(
            EventKind::ApiTimeout,
            format!("API timeout: {}", error),
            Some(json!({ "error": error })),
        );
    }

    pub fn api_error(&mut self, error: &str) {
        self.emit(
            EventKind::ApiError,
            format!("API error: {}", error),
            Some(json!({ "error": error })),
        );
    }

    pub fn processing_stopped(&mut self, completed: usize, remaining: usize) {
        self.emit(
            EventKind::ProcessingStopped,
            format!("Processing stopped: {} completed, {} remaining", completed, remaining),
            Some(json!({ "apps_completed": completed, "apps_remaining": remaining })),
        );
    }

    pub fn cleared(&mut self, apps_reset: usize, fields_cleared: usize, images_deleted: usize) {
        self.emit(
            EventKind::Cleared,
            format!(
                "Cleared: {} apps reset, {} fields, {} images",
                apps_reset, fields_cleared, images_deleted
            ),
            Some(json!({
                "apps_reset": apps_reset,
                "fields_cleared": fields_cleared,
                "images_deleted": images_deleted,
            })),
        );
    }

    pub fn system_error(&mut self, error: &str, context: Option<&str>) {
        let message = match context {
            Some(context) => format!("System error in {}: {}", context, error),
            None => format!("System error: {}", error),
        };
        self.emit(
            EventKind::SystemError,
            message,
            Some(json!({ "error": error, "context": context })),
        );
    }
}

/// Tracks extractor response times over a short rolling window and reports
/// transitions between healthy and degraded. Create one per batch run.
#[derive(Debug, Default)]
pub struct ApiHealth {
    degraded: bool,
    window: VecDeque<f64>,
}

impl ApiHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn rolling_average(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
        }
    }

    pub fn reset(&mut self) {
        self.degraded = false;
        self.window.clear();
    }

    /// Record one response time; only state changes produce events.
    pub fn record(&mut self, response_seconds: f64, events: &mut EventLog) {
        self.window.push_back(response_seconds);
        while self.window.len() > HEALTH_WINDOW {
            self.window.pop_front();
        }
        let average = self.rolling_average().unwrap_or(response_seconds);

        if average > API_VERY_SLOW_THRESHOLD && !self.degraded {
            self.degraded = true;
            events.emit(
                EventKind::ApiDegraded,
                format!(
                    "API response degraded: {:.1}s avg (typical: {}s)",
                    average, API_BASELINE_RESPONSE
                ),
                Some(json!({
                    "avg_response_seconds": round1(average),
                    "typical_response_seconds": API_BASELINE_RESPONSE,
                })),
            );
        } else if average < API_SLOW_THRESHOLD && self.degraded {
            self.degraded = false;
            events.emit(
                EventKind::ApiRecovered,
                format!("API response normalized: {:.1}s avg", average),
                Some(json!({ "avg_response_seconds": round1(average) })),
            );
        } else if response_seconds > API_VERY_SLOW_THRESHOLD * 2.0 && !self.degraded {
            events.emit(
                EventKind::ApiSlow,
                format!(
                    "API response slow: {:.1}s (typical: {}s)",
                    response_seconds, API_BASELINE_RESPONSE
                ),
                Some(json!({
                    "response_seconds": round1(response_seconds),
                    "typical_response_seconds": API_BASELINE_RESPONSE,
                })),
            );
        }
    }
}

/// `42s` under a minute, `3m 5s` otherwise.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.0}s", seconds);
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{}m {}s", minutes, secs)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(log: &EventLog) -> Vec<EventKind> {
        log.events().iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_degrade_and_recover() {
        let mut log = EventLog::in_memory();
        let mut health = ApiHealth::new();

        for _ in 0..3 {
            health.record(1.0, &mut log);
        }
        assert!(log.events().is_empty());

        // One spike: avg 5.75, slow but not degraded
        health.record(20.0, &mut log);
        assert!(!health.is_degraded());
        // Second spike: avg of [1, 1, 1, 20, 20] = 8.6
        health.record(20.0, &mut log);
        assert!(health.is_degraded());
        assert_eq!(kinds(&log), vec![EventKind::ApiDegraded, EventKind::ApiSlow]);

        for _ in 0..5 {
            health.record(1.0, &mut log);
        }
        assert!(!health.is_degraded());
        assert_eq!(log.latest().unwrap().kind, EventKind::ApiRecovered);
        assert_eq!(log.events().len(), 3);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut log = EventLog::in_memory();
        let mut health = ApiHealth::new();
        for _ in 0..5 {
            health.record(20.0, &mut log);
        }
        assert!(health.is_degraded());
        health.reset();
        assert!(!health.is_degraded());
        assert!(health.rolling_average().is_none());
    }

    #[test]
    fn test_log_is_capped_and_newest_first() {
        let mut log = EventLog::in_memory();
        for i in 0..(MAX_EVENTS + 20) {
            log.api_error(&format!("failure {}", i));
        }
        assert_eq!(log.events().len(), MAX_EVENTS);
        assert_eq!(log.latest().unwrap().message, format!("API error: failure {}", MAX_EVENTS + 19));
    }

    #[test]
    fn test_batch_complete_message() {
        let mut log = EventLog::in_memory();
        log.batch_complete(4, 130.0, 1);
        assert_eq!(log.latest().unwrap().message, "Batch complete: 4 apps in 2m 10s (32.5s/app), 1 errors");
        log.batch_complete(0, 0.0, 0);
        assert_eq!(log.latest().unwrap().message, "Batch complete: no applications to process");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.4), "42s");
        assert_eq!(format_duration(185.9), "3m 5s");
    }

    #[test]
    fn test_persisted_log_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification").join("events.json");
        {
            let mut log = EventLog::open(&path);
            log.batch_started(3);
            log.processing_stopped(1, 2);
        }
        let reopened = EventLog::open(&path);
        assert_eq!(
            kinds(&reopened),
            vec![EventKind::ProcessingStopped, EventKind::BatchStarted]
        );
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"type\": \"processing_stopped\""));
    }
}
