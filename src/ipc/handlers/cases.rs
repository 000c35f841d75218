use crate::cases::{CaseDelta, CaseStatus, ProgressStatus};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::mutator::MutationError;
use crate::remote::RemoteError;
use crate::resync::resynchronize;
use crate::workspace::WorkspaceCases;
use serde_json::json;
use std::collections::BTreeMap;

fn no_workspace(id: &str) -> serde_json::Value {
    err(id, "no_workspace", "select a workspace first", None)
}

fn parse_status(params: &serde_json::Value, key: &str) -> Result<CaseStatus, HandlerErr> {
    let raw = get_required_str(params, key)?;
    CaseStatus::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown {} {:?}", key, raw),
        details: Some(json!({
            "allowed": CaseStatus::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        })),
    })
}

fn parse_progress(params: &serde_json::Value, key: &str) -> Result<ProgressStatus, HandlerErr> {
    let raw = get_required_str(params, key)?;
    ProgressStatus::parse(&raw).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown {} {:?}", key, raw),
        details: Some(json!({
            "allowed": ProgressStatus::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        })),
    })
}

fn mutation_err(state: &AppState, id: &str, e: &MutationError) -> serde_json::Value {
    let details = match e {
        MutationError::ConcurrentMutation { case_id } | MutationError::CaseNotFound { case_id } => {
            json!({ "caseId": case_id })
        }
        MutationError::Conflict {
            case_id,
            expected,
            current,
            reloaded,
        } => json!({
            "caseId": case_id,
            "expectedVersion": expected,
            "currentVersion": current,
            "reloaded": reloaded,
            "case": state.store.get(case_id),
        }),
        MutationError::Remote { case_id, cause, .. } => json!({
            "caseId": case_id,
            "cause": cause.to_string(),
            "case": state.store.get(case_id),
        }),
        MutationError::ResyncFailed { case_id, cause } => json!({
            "caseId": case_id,
            "cause": cause.to_string(),
            "case": state.store.get(case_id),
        }),
    };
    err(id, e.code(), e.to_string(), Some(details))
}

fn run_mutation(state: &mut AppState, req: &Request, case_id: &str, delta: CaseDelta) -> serde_json::Value {
    if let Err(message) = delta.check_shape() {
        return err(&req.id, "bad_params", message, None);
    }
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let mut remote = WorkspaceCases::new(conn);
    let mut audit = WorkspaceCases::new(conn);
    match state
        .mutator
        .mutate(&mut state.store, case_id, delta, &mut remote, &mut audit)
    {
        Ok(case) => ok(&req.id, json!({ "case": case })),
        Err(e) => mutation_err(state, &req.id, &e),
    }
}

fn handle_cases_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let cases = state.store.list();
    ok(
        &req.id,
        json!({ "cases": cases, "pendingCount": state.mutator.pending_count() }),
    )
}

fn handle_cases_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let case_id = match get_required_str(&req.params, "caseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match state.store.get(&case_id) {
        Some(case) => ok(
            &req.id,
            json!({ "case": case, "pending": state.mutator.is_pending(&case_id) }),
        ),
        None => err(
            &req.id,
            "case_not_found",
            format!("case not found: {}", case_id),
            Some(json!({ "caseId": case_id })),
        ),
    }
}

fn handle_cases_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    match resynchronize(&mut state.store, &mut WorkspaceCases::new(conn)) {
        Ok(count) => ok(&req.id, json!({ "caseCount": count })),
        Err(e) => err(&req.id, "resync_failed", e.to_string(), None),
    }
}

fn handle_cases_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return no_workspace(&req.id);
    };
    let student_reference = match get_required_str(&req.params, "studentReference") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let follow_up_date = match get_optional_str(&req.params, "followUpDate") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match WorkspaceCases::new(conn).create_case(&student_reference, follow_up_date.as_deref()) {
        Ok(case) => {
            tracing::info!(case_id = case.case_id.as_str(), "case created");
            state.store.replace(&case.case_id, case.clone());
            ok(&req.id, json!({ "case": case }))
        }
        Err(RemoteError::Rejected(message)) => err(&req.id, "bad_params", message, None),
        Err(e) => err(&req.id, "remote_failed", e.to_string(), None),
    }
}

fn handle_cases_mutate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let case_id = match get_required_str(&req.params, "caseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(raw_delta) = req.params.get("delta") else {
        return err(&req.id, "bad_params", "missing delta", None);
    };
    let delta: CaseDelta = match serde_json::from_value(raw_delta.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("invalid delta: {}", e), None),
    };
    run_mutation(state, req, &case_id, delta)
}

fn progress_delta(params: &serde_json::Value) -> Result<CaseDelta, HandlerErr> {
    Ok(CaseDelta {
        progress_status: Some(parse_progress(params, "progressStatus")?),
        resolution_notes: get_optional_str(params, "resolutionNotes")?,
        ..Default::default()
    })
}

fn status_delta(params: &serde_json::Value) -> Result<CaseDelta, HandlerErr> {
    Ok(CaseDelta {
        status: Some(parse_status(params, "status")?),
        resolution_notes: get_optional_str(params, "resolutionNotes")?,
        ..Default::default()
    })
}

fn escalation_delta(params: &serde_json::Value) -> Result<CaseDelta, HandlerErr> {
    Ok(CaseDelta {
        status: Some(CaseStatus::EscalatedToAdmin),
        escalation_reason: Some(get_required_str(params, "reason")?),
        ..Default::default()
    })
}

fn follow_up_delta(params: &serde_json::Value) -> Result<CaseDelta, HandlerErr> {
    Ok(CaseDelta {
        follow_up_date: Some(get_required_str(params, "followUpDate")?),
        ..Default::default()
    })
}

fn close_delta(params: &serde_json::Value) -> Result<CaseDelta, HandlerErr> {
    Ok(CaseDelta {
        status: Some(CaseStatus::Closed),
        progress_status: Some(ProgressStatus::Resolved),
        resolution_notes: Some(get_required_str(params, "resolutionNotes")?),
        ..Default::default()
    })
}

/// Shared path for the named lifecycle operations.
fn handle_case_operation(
    state: &mut AppState,
    req: &Request,
    build: fn(&serde_json::Value) -> Result<CaseDelta, HandlerErr>,
) -> serde_json::Value {
    let case_id = match get_required_str(&req.params, "caseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match build(&req.params) {
        Ok(delta) => run_mutation(state, req, &case_id, delta),
        Err(e) => e.response(&req.id),
    }
}

fn handle_cases_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mut by_status: BTreeMap<&'static str, usize> =
        CaseStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut by_progress: BTreeMap<&'static str, usize> =
        ProgressStatus::ALL.iter().map(|p| (p.as_str(), 0)).collect();
    for case in state.store.list() {
        *by_status.entry(case.status.as_str()).or_default() += 1;
        *by_progress.entry(case.progress_status.as_str()).or_default() += 1;
    }
    ok(
        &req.id,
        json!({
            "total": state.store.len(),
            "byStatus": by_status,
            "byProgressStatus": by_progress,
            "pendingCount": state.mutator.pending_count(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cases.list" => Some(handle_cases_list(state, req)),
        "cases.get" => Some(handle_cases_get(state, req)),
        "cases.refresh" => Some(handle_cases_refresh(state, req)),
        "cases.create" => Some(handle_cases_create(state, req)),
        "cases.mutate" => Some(handle_cases_mutate(state, req)),
        "cases.updateProgress" => Some(handle_case_operation(state, req, progress_delta)),
        "cases.updateStatus" => Some(handle_case_operation(state, req, status_delta)),
        "cases.escalate" => Some(handle_case_operation(state, req, escalation_delta)),
        "cases.scheduleFollowUp" => Some(handle_case_operation(state, req, follow_up_delta)),
        "cases.close" => Some(handle_case_operation(state, req, close_delta)),
        "cases.summary" => Some(handle_cases_summary(state, req)),
        _ => None,
    }
}
