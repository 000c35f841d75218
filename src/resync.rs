use crate::remote::{CaseRemote, RemoteError};
use crate::store::CaseStore;

/// Reloads the store from the case source.
///
/// On failure the store is left exactly as it was and the fetch error is
/// returned; nothing is retried.
pub fn resynchronize(store: &mut CaseStore, source: &mut dyn CaseRemote) -> Result<usize, RemoteError> {
    let cases = match source.fetch_cases() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "case resync failed");
            return Err(e);
        }
    };
    let count = cases.len();
    if !store.is_live() {
        tracing::debug!(count, "store detached; dropping resync result");
        return Ok(count);
    }
    store.load(cases);
    tracing::info!(count, "case store resynchronized");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{CaseDelta, CaseStatus, InterventionCase, ProgressStatus};

    fn case(id: &str, version: i64) -> InterventionCase {
        InterventionCase {
            case_id: id.into(),
            student_reference: format!("S-{}", id),
            status: CaseStatus::Open,
            progress_status: ProgressStatus::NoContact,
            resolution_notes: None,
            escalation_reason: None,
            follow_up_date: None,
            created_at: "2026-09-01T08:00:00+00:00".into(),
            version,
        }
    }

    struct FixedSource(Result<Vec<InterventionCase>, RemoteError>);

    impl CaseRemote for FixedSource {
        fn update_case(
            &mut self,
            _case_id: &str,
            _delta: &CaseDelta,
            _expected_version: i64,
        ) -> Result<InterventionCase, RemoteError> {
            Err(RemoteError::Unavailable("read only".into()))
        }

        fn fetch_cases(&mut self) -> Result<Vec<InterventionCase>, RemoteError> {
            self.0.clone()
        }
    }

    #[test]
    fn replaces_store_contents_with_fetched_cases() {
        let mut store = CaseStore::new();
        store.load(vec![case("old", 1)]);
        let mut source = FixedSource(Ok(vec![case("a", 2), case("b", 1)]));

        assert_eq!(resynchronize(&mut store, &mut source), Ok(2));
        assert!(store.get("old").is_none());
        assert_eq!(store.get("a").map(|c| c.version), Some(2));
    }

    #[test]
    fn failed_fetch_leaves_store_untouched() {
        let mut store = CaseStore::new();
        store.load(vec![case("a", 1)]);
        let mut source = FixedSource(Err(RemoteError::Unavailable("offline".into())));

        assert!(resynchronize(&mut store, &mut source).is_err());
        assert_eq!(store.get("a"), Some(&case("a", 1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn detached_store_is_not_reloaded() {
        let mut store = CaseStore::new();
        store.load(vec![case("a", 1)]);
        store.detach();
        let mut source = FixedSource(Ok(vec![case("b", 1)]));

        assert_eq!(resynchronize(&mut store, &mut source), Ok(1));
        assert_eq!(store.get("a"), Some(&case("a", 1)));
        assert!(store.get("b").is_none());
    }
}
