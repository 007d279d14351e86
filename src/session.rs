use serde::{Deserialize, Serialize};
use time::{format_description::well_known, OffsetDateTime};

use crate::error::{PollError, PollStage};
use crate::types::{ResultsReply, ScanStatus, StatusReply, TaskId, Vulnerability};

/// What the poll loop should do after a status reply has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStep {
    /// Keep ticking.
    Continue,
    /// The service reported the done sentinel; fetch results in this tick.
    FetchResults,
    /// The session is terminal.
    Finished,
}

/// State of one submitted scan.
///
/// All transitions go through the methods below; each one is a no-op once the
/// session is terminal so late replies cannot overwrite a final state.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanSession {
    pub target: String,
    pub scan_type: Option<String>,
    pub task_id: TaskId,
    pub status: ScanStatus,
    /// Last raw status string reported by the service.
    pub service_status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    /// `None` until the results fetch succeeds.
    pub vulnerabilities: Option<Vec<Vulnerability>>,
    pub message: Option<String>,
    pub error: Option<PollError>,
    pub created_at: String,
    pub updated_at: String,
}

impl ScanSession {
    pub fn new(
        target: impl Into<String>,
        scan_type: Option<String>,
        task_id: TaskId,
        service_status: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            target: target.into(),
            scan_type,
            task_id,
            status: ScanStatus::Submitted,
            service_status: service_status.into(),
            attempts: 0,
            max_attempts,
            vulnerabilities: None,
            message: None,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Count a poll tick. Returns the new attempt number, or `None` when terminal.
    pub fn begin_tick(&mut self) -> Option<u32> {
        if self.is_terminal() || self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.touch();
        Some(self.attempts)
    }

    pub fn apply_status(&mut self, reply: &StatusReply) -> StatusStep {
        if self.is_terminal() {
            return StatusStep::Finished;
        }
        if reply.is_error() {
            let message = reply
                .message
                .clone()
                .unwrap_or_else(|| "scan service reported an error".to_string());
            self.finish_with_error(PollError::Service { message });
            return StatusStep::Finished;
        }

        self.status = ScanStatus::Running;
        self.service_status = reply.status.clone();
        self.touch();

        if reply.is_done() {
            return StatusStep::FetchResults;
        }
        if self.attempts >= self.max_attempts {
            self.status = ScanStatus::Timeout;
            self.message = Some(format!(
                "Scan timeout after {} attempts. Last status: {}",
                self.max_attempts, self.service_status
            ));
            return StatusStep::Finished;
        }
        StatusStep::Continue
    }

    /// Settle the session from a results payload. Always terminal afterwards.
    pub fn apply_results(&mut self, reply: ResultsReply) {
        if self.is_terminal() {
            return;
        }
        if reply.is_completed() {
            self.message = Some(crate::render::summary_line(&reply.vulnerabilities));
            self.vulnerabilities = Some(reply.vulnerabilities);
            self.status = ScanStatus::Done;
            self.touch();
        } else {
            let message = reply
                .message
                .unwrap_or_else(|| format!("unexpected results status {}", reply.status));
            self.finish_with_error(PollError::Results { message });
        }
    }

    pub fn fail_transport(&mut self, stage: PollStage, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.finish_with_error(PollError::Transport {
            stage,
            message: message.into(),
        });
    }

    /// User stop. Returns `false` if the session already ended.
    pub fn mark_stopped(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ScanStatus::Stopped;
        self.message = Some("Stopping scan...".to_string());
        self.touch();
        true
    }

    /// Record the outcome of the stop request on a stopped session.
    pub fn record_stop_reply(&mut self, message: impl Into<String>) {
        if self.status == ScanStatus::Stopped {
            self.message = Some(message.into());
            self.touch();
        }
    }

    fn finish_with_error(&mut self, error: PollError) {
        self.status = ScanStatus::Error;
        self.message = Some(error.message().to_string());
        self.error = Some(error);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = now_rfc3339();
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
