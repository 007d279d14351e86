//! Text rendering of session state for UI sinks.
//!
//! `Detailed` mirrors a single-scan result panel, `Compact` a one-line entry in a
//! list of concurrent scans.

use std::fmt::Write as _;

use crate::error::{PollError, PollStage};
use crate::session::ScanSession;
use crate::types::{ConnectionReply, HealthReply, ScanStatus, Vulnerability};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStyle {
    #[default]
    Detailed,
    Compact,
}

/// Render the current state of a session.
pub fn render_session(session: &ScanSession, style: RenderStyle) -> String {
    match style {
        RenderStyle::Detailed => render_detailed(session),
        RenderStyle::Compact => render_compact(session),
    }
}

/// One-line outcome used as the session message once results arrive.
pub fn summary_line(vulnerabilities: &[Vulnerability]) -> String {
    if vulnerabilities.is_empty() {
        "No vulnerabilities found.".to_string()
    } else {
        format!("Vulnerabilities found ({})", vulnerabilities.len())
    }
}

/// Numbered findings, e.g. `1. X (High)`.
pub fn render_vulnerabilities(vulnerabilities: &[Vulnerability]) -> String {
    if vulnerabilities.is_empty() {
        return summary_line(vulnerabilities);
    }
    let mut out = format!("{}:\n", summary_line(vulnerabilities));
    for (idx, v) in vulnerabilities.iter().enumerate() {
        let _ = writeln!(out, "{}. {} ({})", idx + 1, v.identifier, v.detail);
    }
    out
}

pub fn render_connection(reply: &ConnectionReply) -> String {
    if reply.is_success() {
        format!(
            "Connection successful!\nOpenVAS Version: {}",
            reply.version.as_deref().unwrap_or("unknown")
        )
    } else {
        format!(
            "Connection failed: {}",
            reply.message.as_deref().unwrap_or("no message from service")
        )
    }
}

pub fn render_health(reply: &HealthReply) -> String {
    format!("Backend is running!\nMessage: {}", reply.message)
}

fn render_detailed(s: &ScanSession) -> String {
    match s.status {
        ScanStatus::Submitted => format!(
            "Scan started! Target: {}\nTask ID: {}\nStatus: {}\n\nMonitoring scan progress...",
            s.target, s.task_id, s.service_status
        ),
        ScanStatus::Running => format!(
            "Scan in progress...\nTarget: {}\nTask ID: {}\nStatus: {}\nAttempts: {}/{}",
            s.target, s.task_id, s.service_status, s.attempts, s.max_attempts
        ),
        ScanStatus::Done => {
            let mut out = format!("Scan complete!\nTarget: {}\n", s.target);
            if let Some(scan_type) = &s.scan_type {
                let _ = writeln!(out, "Type: {scan_type}");
            }
            let _ = write!(out, "Task ID: {}\n\n", s.task_id);
            out.push_str(&render_vulnerabilities(
                s.vulnerabilities.as_deref().unwrap_or_default(),
            ));
            out
        }
        ScanStatus::Error => match &s.error {
            Some(PollError::Results { message }) => {
                format!("Error retrieving results: {message}")
            }
            Some(PollError::Transport { stage: PollStage::Status, message }) => {
                format!("Error polling scan status: {message}")
            }
            Some(PollError::Transport { stage: PollStage::Results, message }) => {
                format!("Error retrieving results: {message}")
            }
            Some(PollError::Service { message }) => format!("Error: {message}"),
            None => format!("Error: {}", s.message.as_deref().unwrap_or("unknown error")),
        },
        ScanStatus::Timeout => format!(
            "Scan timeout after {} attempts.\nTask ID: {}\nLast Status: {}",
            s.max_attempts, s.task_id, s.service_status
        ),
        ScanStatus::Stopped => format!(
            "Scan stopped.\nTarget: {}\nTask ID: {}\n{}",
            s.target,
            s.task_id,
            s.message.as_deref().unwrap_or_default()
        ),
    }
}

fn render_compact(s: &ScanSession) -> String {
    match s.status {
        ScanStatus::Submitted => format!("Target: {} | Status: {}", s.target, s.service_status),
        ScanStatus::Running => format!(
            "Target: {} | Status: {} | Attempt: {}/{}",
            s.target, s.service_status, s.attempts, s.max_attempts
        ),
        ScanStatus::Done => format!(
            "Target: {} | Status: Done | Results: {} vulnerabilities",
            s.target,
            s.vulnerabilities.as_ref().map_or(0, Vec::len)
        ),
        ScanStatus::Error => match &s.error {
            Some(PollError::Results { message })
            | Some(PollError::Transport { stage: PollStage::Results, message }) => {
                format!("Target: {} | Status: Done | Error: {message}", s.target)
            }
            _ => format!(
                "Target: {} | Status: error | {}",
                s.target,
                s.message.as_deref().unwrap_or_default()
            ),
        },
        ScanStatus::Timeout => format!(
            "Target: {} | Status: timeout after {} attempts.",
            s.target, s.max_attempts
        ),
        ScanStatus::Stopped => format!(
            "Target: {} | Status: stopped | {}",
            s.target,
            s.message.as_deref().unwrap_or_default()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResultsReply, StatusReply, TaskId};

    fn done_session(vulns: Vec<Vulnerability>) -> ScanSession {
        let mut s = ScanSession::new("10.0.0.5", Some("full".into()), TaskId::new("abc"), "queued", 60);
        s.begin_tick();
        s.apply_status(&StatusReply { status: "Done".into(), message: None });
        s.apply_results(ResultsReply {
            status: "completed".into(),
            message: None,
            vulnerabilities: vulns,
        });
        s
    }

    #[test]
    fn single_finding_lists_count_and_severity() {
        let s = done_session(vec![Vulnerability::named("X", "High")]);
        let text = render_session(&s, RenderStyle::Detailed);
        assert!(text.contains("Vulnerabilities found (1)"));
        assert!(text.contains("1. X (High)"));
        assert!(text.contains("Type: full"));

        let line = render_session(&s, RenderStyle::Compact);
        assert_eq!(line, "Target: 10.0.0.5 | Status: Done | Results: 1 vulnerabilities");
    }

    #[test]
    fn empty_results_say_so() {
        let s = done_session(vec![]);
        assert!(render_session(&s, RenderStyle::Detailed).ends_with("No vulnerabilities found."));
    }

    #[test]
    fn progress_shows_attempt_counter() {
        let mut s = ScanSession::new("host", None, TaskId::new("t1"), "queued", 60);
        s.begin_tick();
        s.apply_status(&StatusReply { status: "Running".into(), message: None });
        assert_eq!(
            render_session(&s, RenderStyle::Compact),
            "Target: host | Status: Running | Attempt: 1/60"
        );
        assert!(render_session(&s, RenderStyle::Detailed).contains("Attempts: 1/60"));
    }

    #[test]
    fn transport_failures_name_the_failing_call() {
        let mut s = ScanSession::new("host", None, TaskId::new("t1"), "queued", 60);
        s.begin_tick();
        s.fail_transport(PollStage::Status, "connection refused");
        assert_eq!(
            render_session(&s, RenderStyle::Detailed),
            "Error polling scan status: connection refused"
        );
    }

    #[test]
    fn connection_replies() {
        let ok = ConnectionReply {
            status: "success".into(),
            version: Some("22.4".into()),
            message: None,
        };
        assert!(render_connection(&ok).contains("OpenVAS Version: 22.4"));
        let bad = ConnectionReply {
            status: "error".into(),
            version: None,
            message: Some("refused".into()),
        };
        assert_eq!(render_connection(&bad), "Connection failed: refused");
    }
}
