use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, get_optional_usize};
use crate::ipc::types::{AppState, Request};
use crate::workspace::WorkspaceCases;
use serde_json::json;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

fn handle_audit_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let case_id = match get_optional_str(&req.params, "caseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let limit = match get_optional_usize(&req.params, "limit") {
        Ok(v) => v.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT),
        Err(e) => return e.response(&req.id),
    };

    match WorkspaceCases::new(conn).list_audit(case_id.as_deref(), limit) {
        Ok(entries) => {
            let rows: Vec<serde_json::Value> = entries
                .into_iter()
                .map(|e| {
                    json!({
                        "id": e.id,
                        "action": e.action,
                        "caseId": e.case_id,
                        "details": e.details,
                        "createdAt": e.created_at,
                    })
                })
                .collect();
            ok(&req.id, json!({ "entries": rows }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "audit.list" => Some(handle_audit_list(state, req)),
        _ => None,
    }
}
