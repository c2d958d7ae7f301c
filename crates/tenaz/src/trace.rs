//! Step trace for one scenario attempt.
//!
//! Sessions record every navigation, resolution, expectation and screenshot
//! here. The runner writes the archive to `trace.json` when the trace policy
//! keeps it.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::result::TenazResult;

/// Kind of step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Page navigation
    Navigate,
    /// Single locator resolution
    Resolve,
    /// Indicator set check
    ResolveAny,
    /// Expectation
    Expect,
    /// Screenshot capture
    Screenshot,
    /// Driver close
    Close,
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Completed / element found
    Ok,
    /// Budget exhausted without a match
    NotFound,
    /// Returned an error
    Failed,
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Milliseconds since the trace started
    pub timestamp_ms: u64,
    /// Step kind
    pub kind: StepKind,
    /// URL, locator label or file name
    pub target: String,
    /// Outcome
    pub status: StepStatus,
    /// Winning candidate, for found resolutions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    /// Step duration in milliseconds
    pub duration_ms: u64,
    /// Error or report text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TraceEvent {
    /// Create an event; the timestamp is set when it is recorded
    #[must_use]
    pub fn new(kind: StepKind, target: impl Into<String>, status: StepStatus) -> Self {
        Self {
            timestamp_ms: 0,
            kind,
            target: target.into(),
            status,
            candidate: None,
            duration_ms: 0,
            message: None,
        }
    }

    /// Set winning candidate
    #[must_use]
    pub fn with_candidate(mut self, candidate: impl Into<String>) -> Self {
        self.candidate = Some(candidate.into());
        self
    }

    /// Set duration
    #[must_use]
    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Identity of a traced attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Unique trace ID
    pub id: String,
    /// Scenario name
    pub scenario: String,
    /// Project name
    pub project: String,
    /// Attempt number (0 = first run)
    pub attempt: u32,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
}

/// Serialized form of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceArchive {
    /// Metadata
    pub metadata: TraceMetadata,
    /// Events in recording order
    pub events: Vec<TraceEvent>,
}

impl TraceArchive {
    /// Save to JSON file
    pub async fn save_json(&self, path: &Path) -> TenazResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Load from JSON file
    pub async fn load_json(path: &Path) -> TenazResult<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Events that failed
    #[must_use]
    pub fn failures(&self) -> Vec<&TraceEvent> {
        self.events
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .collect()
    }
}

/// Append-only step log shared by a session and its expectations
#[derive(Debug)]
pub struct TraceLog {
    metadata: TraceMetadata,
    started: Instant,
    events: Mutex<Vec<TraceEvent>>,
}

impl TraceLog {
    /// Start a trace for one attempt
    #[must_use]
    pub fn new(scenario: impl Into<String>, project: impl Into<String>, attempt: u32) -> Self {
        Self {
            metadata: TraceMetadata {
                id: Uuid::new_v4().to_string(),
                scenario: scenario.into(),
                project: project.into(),
                attempt,
                started_at: Utc::now(),
            },
            started: Instant::now(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Metadata
    #[must_use]
    pub const fn metadata(&self) -> &TraceMetadata {
        &self.metadata
    }

    /// Milliseconds since start
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Stamp and append an event
    pub fn record(&self, mut event: TraceEvent) {
        event.timestamp_ms = self.elapsed_ms();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze into an archive
    #[must_use]
    pub fn to_archive(&self) -> TraceArchive {
        TraceArchive {
            metadata: self.metadata.clone(),
            events: self.events(),
        }
    }
}
