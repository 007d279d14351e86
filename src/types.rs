use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Raw service status that marks a finished scan. The service capitalizes it while
/// in-progress statuses arrive in free-form case, so it is compared exactly.
pub const DONE_STATUS: &str = "Done";

/// Results payload status that carries a vulnerability list.
pub const COMPLETED_STATUS: &str = "completed";

/// Status value the service uses to signal a failure in any payload.
pub const ERROR_STATUS: &str = "error";

/// Status value returned by `/test-connection` when the scanner answered.
pub const SUCCESS_STATUS: &str = "success";

/// Opaque task identifier assigned by the scan service.
///
/// The service may encode it as a JSON string or integer; both land here as text.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Integer(i64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Ok(TaskId(s)),
            RawId::Integer(i) => Ok(TaskId(i.to_string())),
        }
    }
}

/// Lifecycle state of one scan session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Submitted,
    Running,
    Done,
    Error,
    Timeout,
    Stopped,
}

impl ScanStatus {
    /// Terminal states end polling for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanStatus::Done | ScanStatus::Error | ScanStatus::Timeout | ScanStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Submitted => "submitted",
            ScanStatus::Running => "running",
            ScanStatus::Done => "done",
            ScanStatus::Error => "error",
            ScanStatus::Timeout => "timeout",
            ScanStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Which backend shape a vulnerability was reported in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityKind {
    /// `{name, severity}` from the scanner-backed service.
    Named,
    /// `{cve, desc}` from the mock service.
    Cve,
}

/// One finding reported by the scan service, normalized across payload shapes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Vulnerability {
    pub kind: VulnerabilityKind,
    /// Name or CVE id.
    pub identifier: String,
    /// Severity or description.
    pub detail: String,
}

impl Vulnerability {
    pub fn named(name: impl Into<String>, severity: impl Into<String>) -> Self {
        Self {
            kind: VulnerabilityKind::Named,
            identifier: name.into(),
            detail: severity.into(),
        }
    }

    pub fn cve(cve: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            kind: VulnerabilityKind::Cve,
            identifier: cve.into(),
            detail: desc.into(),
        }
    }
}

/// Boundary wrapper that accepts either known vulnerability shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulnerabilityWire(pub Vulnerability);

impl<'de> Deserialize<'de> for VulnerabilityWire {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Named {
                name: String,
                #[serde(default)]
                severity: Option<String>,
            },
            Cve {
                cve: String,
                #[serde(default)]
                desc: Option<String>,
            },
        }

        let item = match Shape::deserialize(deserializer)? {
            Shape::Named { name, severity } => {
                Vulnerability::named(name, severity.unwrap_or_else(|| "unknown".into()))
            }
            Shape::Cve { cve, desc } => Vulnerability::cve(cve, desc.unwrap_or_default()),
        };
        Ok(VulnerabilityWire(item))
    }
}

/// `POST /scan` body.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StartScanRequest {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
}

/// `POST /scan` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StartScanReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /scan-status/{id}` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StatusReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusReply {
    pub fn is_error(&self) -> bool {
        self.status == ERROR_STATUS
    }

    pub fn is_done(&self) -> bool {
        self.status == DONE_STATUS
    }
}

/// `GET /scan-results/{id}` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ResultsReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "result", deserialize_with = "deserialize_vulnerabilities")]
    pub vulnerabilities: Vec<Vulnerability>,
}

impl ResultsReply {
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}

fn deserialize_vulnerabilities<'de, D>(deserializer: D) -> Result<Vec<Vulnerability>, D::Error>
where
    D: Deserializer<'de>,
{
    // `null` shows up when a report exists but carries no findings.
    let items = Option::<Vec<VulnerabilityWire>>::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(|VulnerabilityWire(v)| v)
        .collect())
}

/// `POST /stop-scan/{id}` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StopReply {
    #[serde(default)]
    pub message: String,
}

/// `GET /test-connection` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConnectionReply {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ConnectionReply {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS
    }
}

/// `GET /` reply.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct HealthReply {
    #[serde(default)]
    pub message: String,
}
