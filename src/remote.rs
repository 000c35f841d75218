use crate::cases::{CaseDelta, InterventionCase};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The case source holds a different version than the one the client sent.
    #[error("version conflict on case {case_id}: expected {expected}, current {current}")]
    Conflict {
        case_id: String,
        expected: i64,
        current: i64,
    },
    /// The source refused the change. The message is meant for the user.
    #[error("{0}")]
    Rejected(String),
    #[error("case source unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Message supplied by the source, if it gave a usable one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RemoteError::Rejected(m) if !m.trim().is_empty() => Some(m.as_str()),
            _ => None,
        }
    }
}

/// Authoritative case source consumed by the mutator and the resynchronizer.
pub trait CaseRemote {
    fn update_case(
        &mut self,
        case_id: &str,
        delta: &CaseDelta,
        expected_version: i64,
    ) -> Result<InterventionCase, RemoteError>;

    fn fetch_cases(&mut self) -> Result<Vec<InterventionCase>, RemoteError>;
}

/// Best-effort sink for committed mutations.
pub trait AuditSink {
    fn log_audit_trail(&mut self, action: &str, details: &serde_json::Value) -> anyhow::Result<()>;
}
