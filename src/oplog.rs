//! Rolling operational log.
//!
//! The only persistence the agent has is this in-process buffer, so every
//! command invocation, scan, and mutation appends at least one record here.
//! It is an explicitly owned component handed out behind an `Arc`, so
//! tests instantiate their own isolated instances.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Monotonic sequence number, never reused even after eviction.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug)]
struct Buffer {
    records: VecDeque<LogRecord>,
    next_seq: u64,
}

/// Bounded, thread-safe, append-only operation log with oldest-first
/// eviction.
#[derive(Debug)]
pub struct OpLog {
    capacity: usize,
    inner: Mutex<Buffer>,
}

impl Default for OpLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl OpLog {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "log capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Buffer {
                records: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
        }
    }

    pub fn append(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock().expect("oplog mutex poisoned");
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.push_back(LogRecord {
            seq,
            timestamp: Utc::now(),
            severity,
            message,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(Severity::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.append(Severity::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(Severity::Error, message);
    }

    /// The most recent `limit` records in chronological (oldest-first)
    /// order.
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        let inner = self.inner.lock().expect("oplog mutex poisoned");
        let skip = inner.records.len().saturating_sub(limit);
        inner.records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("oplog mutex poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
