//! Build context providing per-stage timing and a log buffer
//!
//! Stages receive a [`BuildContext`] from the driver; timers wrap each stage
//! call and logs accumulate for inspection after the build.

use std::collections::HashMap;
use std::time::Duration;
use web_time::Instant;

/// Log level for context messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug level messages
    Debug = 0,
    /// Informational messages
    Info = 1,
    /// Warning messages
    Warning = 2,
    /// Error messages
    Error = 3,
}

/// Timer categories, one per pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerCategory {
    /// Whole-tile build
    Total,
    /// Triangle rasterization
    Rasterization,
    /// Heightfield span filtering
    Filtering,
    /// Compact field construction
    Compaction,
    /// Area marking and erosion
    AreaMarking,
    /// Distance field construction
    DistanceField,
    /// Region segmentation
    Regions,
    /// Contour extraction
    Contours,
}

/// A recorded log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity of the entry
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

/// Context for pipeline operations carrying logs and stage timers
#[derive(Debug, Default)]
pub struct BuildContext {
    logs: Vec<LogEntry>,
    active: HashMap<TimerCategory, Instant>,
    accumulated: HashMap<TimerCategory, Duration>,
}

impl BuildContext {
    /// Creates a new context
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level,
            message: message.into(),
        });
    }

    /// Records a warning
    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    /// Returns all recorded log entries
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Starts the timer for a category
    pub fn start_timer(&mut self, category: TimerCategory) {
        self.active.insert(category, Instant::now());
    }

    /// Stops the timer for a category, accumulating its elapsed time
    pub fn stop_timer(&mut self, category: TimerCategory) {
        if let Some(start) = self.active.remove(&category) {
            *self.accumulated.entry(category).or_default() += start.elapsed();
        }
    }

    /// Total accumulated time for a category
    pub fn timer(&self, category: TimerCategory) -> Option<Duration> {
        self.accumulated.get(&category).copied()
    }

    /// Returns `(category, duration)` pairs sorted by descending duration
    pub fn timer_summary(&self) -> Vec<(TimerCategory, Duration)> {
        let mut entries: Vec<_> = self
            .accumulated
            .iter()
            .map(|(&category, &duration)| (category, duration))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }

    /// Clears logs and timers
    pub fn reset(&mut self) {
        self.logs.clear();
        self.active.clear();
        self.accumulated.clear();
    }
}
