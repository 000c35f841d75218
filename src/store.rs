use crate::cases::{CaseDelta, InterventionCase};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("case not found: {0}")]
    NotFound(String),
}

/// Client-side mirror of the case source, keyed by case id.
///
/// All writes go through `load`, `apply_local` and `replace`. A store that has
/// been detached (its owner went away) still answers reads, but writers are
/// expected to check `is_live` first and drop late results.
#[derive(Debug)]
pub struct CaseStore {
    cases: HashMap<String, InterventionCase>,
    live: bool,
}

impl Default for CaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseStore {
    pub fn new() -> Self {
        Self {
            cases: HashMap::new(),
            live: true,
        }
    }

    pub fn load(&mut self, cases: Vec<InterventionCase>) {
        self.cases = cases
            .into_iter()
            .map(|c| (c.case_id.clone(), c))
            .collect();
    }

    pub fn get(&self, case_id: &str) -> Option<&InterventionCase> {
        self.cases.get(case_id)
    }

    /// Merges `delta` into the stored case and returns the value it had before.
    pub fn apply_local(
        &mut self,
        case_id: &str,
        delta: &CaseDelta,
    ) -> Result<InterventionCase, StoreError> {
        let Some(entry) = self.cases.get_mut(case_id) else {
            return Err(StoreError::NotFound(case_id.to_string()));
        };
        let previous = entry.clone();
        delta.apply_to(entry);
        Ok(previous)
    }

    /// Overwrites (or inserts) the whole record for `case_id`.
    pub fn replace(&mut self, case_id: &str, case: InterventionCase) {
        self.cases.insert(case_id.to_string(), case);
    }

    /// Cases ordered the way the case source lists them.
    pub fn list(&self) -> Vec<&InterventionCase> {
        let mut out: Vec<&InterventionCase> = self.cases.values().collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.case_id.cmp(&b.case_id))
        });
        out
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn detach(&mut self) {
        self.live = false;
    }
}
