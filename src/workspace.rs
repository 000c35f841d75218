use crate::cases::{parse_follow_up_date, CaseDelta, CaseStatus, InterventionCase, ProgressStatus};
use crate::remote::{AuditSink, CaseRemote, RemoteError};
use anyhow::Context;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const CASE_COLUMNS: &str = "case_id, student_reference, status, progress_status, resolution_notes,
     escalation_reason, follow_up_date, created_at, version";

/// Case source backed by the workspace database.
///
/// This is the authority for `version`: every accepted update bumps it by one
/// inside the same transaction that checks it.
#[derive(Clone, Copy)]
pub struct WorkspaceCases<'a> {
    conn: &'a Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: String,
    pub action: String,
    pub case_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

impl<'a> WorkspaceCases<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn create_case(
        &self,
        student_reference: &str,
        follow_up_date: Option<&str>,
    ) -> Result<InterventionCase, RemoteError> {
        let student_reference = student_reference.trim();
        if student_reference.is_empty() {
            return Err(RemoteError::Rejected(
                "studentReference must not be empty".to_string(),
            ));
        }
        if let Some(date) = follow_up_date {
            parse_follow_up_date(date).map_err(RemoteError::Rejected)?;
        }
        let case = InterventionCase {
            case_id: Uuid::new_v4().to_string(),
            student_reference: student_reference.to_string(),
            status: CaseStatus::Open,
            progress_status: ProgressStatus::NoContact,
            resolution_notes: None,
            escalation_reason: None,
            follow_up_date: follow_up_date.map(|d| d.trim().to_string()),
            created_at: now_rfc3339(),
            version: 1,
        };
        self.conn
            .execute(
                "INSERT INTO cases(case_id, student_reference, status, progress_status,
                   follow_up_date, created_at, version)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                params![
                    case.case_id,
                    case.student_reference,
                    case.status.as_str(),
                    case.progress_status.as_str(),
                    case.follow_up_date,
                    case.created_at,
                    case.version
                ],
            )
            .map_err(unavailable)?;
        Ok(case)
    }

    pub fn load_case(&self, case_id: &str) -> Result<Option<InterventionCase>, RemoteError> {
        load_case(self.conn, case_id).map_err(unavailable)
    }

    /// Newest first.
    pub fn list_audit(
        &self,
        case_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, case_id, details, created_at
             FROM audit_trail
             WHERE (?1 IS NULL OR case_id = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![case_id, limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, action, case_id, details, created_at)| -> anyhow::Result<AuditEntry> {
                let details = serde_json::from_str(&details)
                    .with_context(|| format!("audit entry {} has invalid details", id))?;
                Ok(AuditEntry {
                    id,
                    action,
                    case_id,
                    details,
                    created_at,
                })
            })
            .collect()
    }
}

impl CaseRemote for WorkspaceCases<'_> {
    fn update_case(
        &mut self,
        case_id: &str,
        delta: &CaseDelta,
        expected_version: i64,
    ) -> Result<InterventionCase, RemoteError> {
        // Take the write lock up front so a racing writer waits on busy_timeout
        // and then sees the bumped version instead of failing its lock upgrade.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(unavailable)?;
        let Some(mut current) = load_case(&tx, case_id).map_err(unavailable)? else {
            return Err(RemoteError::Rejected(format!("case {} not found", case_id)));
        };
        if current.version != expected_version {
            return Err(RemoteError::Conflict {
                case_id: case_id.to_string(),
                expected: expected_version,
                current: current.version,
            });
        }
        validate_change(&current, delta).map_err(RemoteError::Rejected)?;

        delta.apply_to(&mut current);
        current.version += 1;
        let changed = tx
            .execute(
                "UPDATE cases
                 SET status = ?, progress_status = ?, resolution_notes = ?,
                     escalation_reason = ?, follow_up_date = ?, updated_at = ?, version = ?
                 WHERE case_id = ? AND version = ?",
                params![
                    current.status.as_str(),
                    current.progress_status.as_str(),
                    current.resolution_notes,
                    current.escalation_reason,
                    current.follow_up_date,
                    now_rfc3339(),
                    current.version,
                    case_id,
                    expected_version
                ],
            )
            .map_err(unavailable)?;
        if changed == 0 {
            return Err(RemoteError::Conflict {
                case_id: case_id.to_string(),
                expected: expected_version,
                current: expected_version + 1,
            });
        }
        tx.commit().map_err(unavailable)?;
        Ok(current)
    }

    fn fetch_cases(&mut self) -> Result<Vec<InterventionCase>, RemoteError> {
        let sql = format!(
            "SELECT {} FROM cases ORDER BY created_at, case_id",
            CASE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(unavailable)?;
        stmt.query_map([], row_to_case)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(unavailable)
    }
}

impl AuditSink for WorkspaceCases<'_> {
    fn log_audit_trail(&mut self, action: &str, details: &serde_json::Value) -> anyhow::Result<()> {
        let case_id = details.get("caseId").and_then(|v| v.as_str());
        self.conn.execute(
            "INSERT INTO audit_trail(id, action, case_id, details, created_at)
             VALUES(?, ?, ?, ?, ?)",
            params![
                Uuid::new_v4().to_string(),
                action,
                case_id,
                serde_json::to_string(details)?,
                now_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// Business rules the source enforces on every update.
fn validate_change(current: &InterventionCase, delta: &CaseDelta) -> Result<(), String> {
    if delta.is_empty() {
        return Err("no changes submitted".to_string());
    }
    if current.status == CaseStatus::Closed {
        return Err("case is closed and can no longer be changed".to_string());
    }
    delta.check_shape()?;

    let has_text = |delta_value: &Option<String>, current_value: &Option<String>| {
        delta_value
            .as_deref()
            .or(current_value.as_deref())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    };
    match delta.status {
        Some(CaseStatus::EscalatedToAdmin)
            if !has_text(&delta.escalation_reason, &current.escalation_reason) =>
        {
            Err("escalation requires a reason".to_string())
        }
        Some(CaseStatus::Closed)
            if !has_text(&delta.resolution_notes, &current.resolution_notes) =>
        {
            Err("closing a case requires resolution notes".to_string())
        }
        _ => Ok(()),
    }
}

fn load_case(conn: &Connection, case_id: &str) -> rusqlite::Result<Option<InterventionCase>> {
    let sql = format!("SELECT {} FROM cases WHERE case_id = ?", CASE_COLUMNS);
    conn.query_row(&sql, [case_id], row_to_case).optional()
}

fn row_to_case(r: &Row<'_>) -> rusqlite::Result<InterventionCase> {
    let status: String = r.get(2)?;
    let progress: String = r.get(3)?;
    Ok(InterventionCase {
        case_id: r.get(0)?,
        student_reference: r.get(1)?,
        status: CaseStatus::parse(&status).ok_or_else(|| bad_enum(2, "status", &status))?,
        progress_status: ProgressStatus::parse(&progress)
            .ok_or_else(|| bad_enum(3, "progress_status", &progress))?,
        resolution_notes: r.get(4)?,
        escalation_reason: r.get(5)?,
        follow_up_date: r.get(6)?,
        created_at: r.get(7)?,
        version: r.get(8)?,
    })
}

fn bad_enum(idx: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unknown {} value {:?}", column, value).into(),
    )
}

fn unavailable(e: rusqlite::Error) -> RemoteError {
    RemoteError::Unavailable(e.to_string())
}

fn now_rfc3339() -> String {
    // Fixed width so text ordering matches time ordering.
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
