use crate::cases::{CaseDelta, InterventionCase};
use crate::remote::{AuditSink, CaseRemote, RemoteError};
use crate::resync::resynchronize;
use crate::store::{CaseStore, StoreError};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

pub const CONFLICT_MESSAGE: &str = "Case was modified by another user. Refreshing...";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Failed to update case";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("an update to case {case_id} is already in progress")]
    ConcurrentMutation { case_id: String },
    #[error("case not found: {case_id}")]
    CaseNotFound { case_id: String },
    #[error("{}", CONFLICT_MESSAGE)]
    Conflict {
        case_id: String,
        expected: i64,
        current: i64,
        reloaded: usize,
    },
    #[error("{message}")]
    Remote {
        case_id: String,
        message: String,
        cause: RemoteError,
    },
    #[error("Case was modified by another user, and refreshing failed: {cause}")]
    ResyncFailed { case_id: String, cause: RemoteError },
}

impl MutationError {
    pub fn code(&self) -> &'static str {
        match self {
            MutationError::ConcurrentMutation { .. } => "concurrent_mutation",
            MutationError::CaseNotFound { .. } => "case_not_found",
            MutationError::Conflict { .. } => "conflict",
            MutationError::Remote { .. } => "remote_failed",
            MutationError::ResyncFailed { .. } => "resync_failed",
        }
    }
}

/// A mutation that has been applied locally and is waiting on the case source.
///
/// Dropping one without calling [`Mutator::settle`] leaves its case marked busy.
#[derive(Debug)]
#[must_use = "a pending mutation must be settled"]
pub struct PendingMutation {
    case_id: String,
    delta: CaseDelta,
    snapshot: InterventionCase,
    correlation_id: Uuid,
}

impl PendingMutation {
    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn delta(&self) -> &CaseDelta {
        &self.delta
    }

    /// The version the client believed current when the mutation started.
    pub fn expected_version(&self) -> i64 {
        self.snapshot.version
    }
}

/// Runs optimistic case mutations: snapshot, apply locally, confirm or roll back.
#[derive(Debug)]
pub struct Mutator {
    busy: HashSet<String>,
    default_failure_message: String,
}

impl Default for Mutator {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator {
    pub fn new() -> Self {
        Self {
            busy: HashSet::new(),
            default_failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn with_default_failure_message(mut self, message: impl Into<String>) -> Self {
        self.set_default_failure_message(message);
        self
    }

    pub fn set_default_failure_message(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !message.trim().is_empty() {
            self.default_failure_message = message;
        }
    }

    pub fn is_pending(&self, case_id: &str) -> bool {
        self.busy.contains(case_id)
    }

    pub fn pending_count(&self) -> usize {
        self.busy.len()
    }

    /// Checks exclusivity, snapshots the case and applies `delta` to the store.
    pub fn begin(
        &mut self,
        store: &mut CaseStore,
        case_id: &str,
        delta: CaseDelta,
    ) -> Result<PendingMutation, MutationError> {
        if self.busy.contains(case_id) {
            tracing::debug!(case_id, "rejecting mutation; case already pending");
            return Err(MutationError::ConcurrentMutation {
                case_id: case_id.to_string(),
            });
        }
        let not_found = || MutationError::CaseNotFound {
            case_id: case_id.to_string(),
        };
        if store.get(case_id).is_none() {
            return Err(not_found());
        }
        let snapshot = store.apply_local(case_id, &delta).map_err(|e| match e {
            StoreError::NotFound(_) => not_found(),
        })?;

        let correlation_id = Uuid::new_v4();
        self.busy.insert(case_id.to_string());
        tracing::info!(
            %correlation_id,
            case_id,
            expected_version = snapshot.version,
            action = delta.action(),
            "mutation pending"
        );
        Ok(PendingMutation {
            case_id: case_id.to_string(),
            delta,
            snapshot,
            correlation_id,
        })
    }

    /// Reconciles a pending mutation with the case source's answer.
    ///
    /// `source` is only used to resynchronize after a conflict.
    pub fn settle(
        &mut self,
        store: &mut CaseStore,
        pending: PendingMutation,
        outcome: Result<InterventionCase, RemoteError>,
        source: &mut dyn CaseRemote,
        audit: &mut dyn AuditSink,
    ) -> Result<InterventionCase, MutationError> {
        let PendingMutation {
            case_id,
            delta,
            snapshot,
            correlation_id,
        } = pending;
        self.busy.remove(&case_id);
        let live = store.is_live();
        if !live {
            tracing::debug!(%correlation_id, case_id = case_id.as_str(), "store detached; result not applied");
        }

        match outcome {
            Ok(server_case) => {
                if live {
                    store.replace(&case_id, server_case.clone());
                }
                tracing::info!(
                    %correlation_id,
                    case_id = case_id.as_str(),
                    version = server_case.version,
                    "mutation committed"
                );
                let details = json!({
                    "caseId": &case_id,
                    "delta": &delta,
                    "outcome": "committed",
                    "version": server_case.version,
                    "correlationId": correlation_id.to_string(),
                });
                if let Err(e) = audit.log_audit_trail(delta.action(), &details) {
                    tracing::warn!(%correlation_id, case_id = case_id.as_str(), error = %e, "audit trail write failed");
                }
                Ok(server_case)
            }
            Err(RemoteError::Conflict {
                expected, current, ..
            }) => {
                tracing::warn!(
                    %correlation_id,
                    case_id = case_id.as_str(),
                    expected,
                    current,
                    "version conflict; rolling back"
                );
                if !live {
                    return Err(MutationError::Conflict {
                        case_id,
                        expected,
                        current,
                        reloaded: 0,
                    });
                }
                store.replace(&case_id, snapshot);
                match resynchronize(store, source) {
                    Ok(reloaded) => Err(MutationError::Conflict {
                        case_id,
                        expected,
                        current,
                        reloaded,
                    }),
                    Err(cause) => Err(MutationError::ResyncFailed { case_id, cause }),
                }
            }
            Err(cause) => {
                tracing::warn!(%correlation_id, case_id = case_id.as_str(), error = %cause, "mutation rolled back");
                if live {
                    store.replace(&case_id, snapshot);
                }
                let message = cause
                    .server_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.default_failure_message.clone());
                Err(MutationError::Remote {
                    case_id,
                    message,
                    cause,
                })
            }
        }
    }

    /// `begin`, the remote update and `settle` in one go.
    pub fn mutate<R: CaseRemote>(
        &mut self,
        store: &mut CaseStore,
        case_id: &str,
        delta: CaseDelta,
        remote: &mut R,
        audit: &mut dyn AuditSink,
    ) -> Result<InterventionCase, MutationError> {
        let pending = self.begin(store, case_id, delta)?;
        let outcome = remote.update_case(
            pending.case_id(),
            pending.delta(),
            pending.expected_version(),
        );
        self.settle(store, pending, outcome, remote, audit)
    }
}
