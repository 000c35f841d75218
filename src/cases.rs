use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an intervention case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    InProgress,
    Monitoring,
    Improving,
    NotImproving,
    EscalatedToAdmin,
    Closed,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 7] = [
        CaseStatus::Open,
        CaseStatus::InProgress,
        CaseStatus::Monitoring,
        CaseStatus::Improving,
        CaseStatus::NotImproving,
        CaseStatus::EscalatedToAdmin,
        CaseStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Monitoring => "monitoring",
            CaseStatus::Improving => "improving",
            CaseStatus::NotImproving => "not_improving",
            CaseStatus::EscalatedToAdmin => "escalated_to_admin",
            CaseStatus::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw.trim())
    }
}

/// Contact/progress axis, tracked independently of [`CaseStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NoContact,
    Contacted,
    Improving,
    NotImproving,
    Resolved,
}

impl ProgressStatus {
    pub const ALL: [ProgressStatus; 5] = [
        ProgressStatus::NoContact,
        ProgressStatus::Contacted,
        ProgressStatus::Improving,
        ProgressStatus::NotImproving,
        ProgressStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NoContact => "no_contact",
            ProgressStatus::Contacted => "contacted",
            ProgressStatus::Improving => "improving",
            ProgressStatus::NotImproving => "not_improving",
            ProgressStatus::Resolved => "resolved",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionCase {
    pub case_id: String,
    pub student_reference: String,
    pub status: CaseStatus,
    pub progress_status: ProgressStatus,
    pub resolution_notes: Option<String>,
    pub escalation_reason: Option<String>,
    pub follow_up_date: Option<String>,
    pub created_at: String,
    /// Optimistic-concurrency token. Only the case source ever advances it.
    pub version: i64,
}

/// Field-level change to a case. Carries no `version`; unknown fields
/// (including `version`) are rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaseDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_status: Option<ProgressStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,
}

impl CaseDelta {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress_status.is_none()
            && self.resolution_notes.is_none()
            && self.escalation_reason.is_none()
            && self.follow_up_date.is_none()
    }

    /// Merges the delta into `case`. `version` is left alone.
    pub fn apply_to(&self, case: &mut InterventionCase) {
        if let Some(status) = self.status {
            case.status = status;
        }
        if let Some(progress) = self.progress_status {
            case.progress_status = progress;
        }
        if let Some(notes) = &self.resolution_notes {
            case.resolution_notes = Some(notes.clone());
        }
        if let Some(reason) = &self.escalation_reason {
            case.escalation_reason = Some(reason.clone());
        }
        if let Some(date) = &self.follow_up_date {
            case.follow_up_date = Some(date.clone());
        }
    }

    /// Audit action name for a committed delta.
    pub fn action(&self) -> &'static str {
        match self.status {
            Some(CaseStatus::EscalatedToAdmin) => "case.escalated",
            Some(CaseStatus::Closed) => "case.closed",
            Some(_) => "case.status_updated",
            None if self.progress_status.is_some() => "case.progress_updated",
            None if self.follow_up_date.is_some() => "case.follow_up_scheduled",
            None => "case.updated",
        }
    }

    /// Shape checks that do not need the current case. Business rules are the
    /// case source's job.
    pub fn check_shape(&self) -> Result<(), String> {
        if let Some(date) = &self.follow_up_date {
            parse_follow_up_date(date)?;
        }
        Ok(())
    }
}

pub fn parse_follow_up_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("followUpDate must be YYYY-MM-DD, got {:?}", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> InterventionCase {
        InterventionCase {
            case_id: "42".into(),
            student_reference: "S-1001".into(),
            status: CaseStatus::Open,
            progress_status: ProgressStatus::NoContact,
            resolution_notes: None,
            escalation_reason: None,
            follow_up_date: None,
            created_at: "2026-09-01T08:00:00+00:00".into(),
            version: 3,
        }
    }

    #[test]
    fn apply_merges_fields_and_keeps_version() {
        let mut c = sample();
        let delta = CaseDelta {
            status: Some(CaseStatus::EscalatedToAdmin),
            escalation_reason: Some("no progress".into()),
            ..Default::default()
        };
        delta.apply_to(&mut c);
        assert_eq!(c.status, CaseStatus::EscalatedToAdmin);
        assert_eq!(c.escalation_reason.as_deref(), Some("no progress"));
        assert_eq!(c.progress_status, ProgressStatus::NoContact);
        assert_eq!(c.version, 3);
    }

    #[test]
    fn delta_json_rejects_version_field() {
        let raw = json!({ "status": "closed", "version": 9 });
        assert!(serde_json::from_value::<CaseDelta>(raw).is_err());

        let ok = json!({ "progressStatus": "contacted", "resolutionNotes": "called home" });
        let delta: CaseDelta = serde_json::from_value(ok).expect("parse delta");
        assert_eq!(delta.progress_status, Some(ProgressStatus::Contacted));
        assert_eq!(delta.action(), "case.progress_updated");
    }

    #[test]
    fn status_names_round_trip_through_parse() {
        for s in CaseStatus::ALL {
            assert_eq!(CaseStatus::parse(s.as_str()), Some(s));
        }
        for p in ProgressStatus::ALL {
            assert_eq!(ProgressStatus::parse(p.as_str()), Some(p));
        }
        assert_eq!(CaseStatus::parse("escalated"), None);
    }

    #[test]
    fn follow_up_date_shape_is_checked() {
        let bad = CaseDelta {
            follow_up_date: Some("next tuesday".into()),
            ..Default::default()
        };
        assert!(bad.check_shape().is_err());
        let good = CaseDelta {
            follow_up_date: Some("2026-11-02".into()),
            ..Default::default()
        };
        assert!(good.check_shape().is_ok());
        assert_eq!(good.action(), "case.follow_up_scheduled");
    }
}
