use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{Config, SETTING_DEFAULT_FAILURE_MESSAGE};
use crate::db;
use crate::mutator::Mutator;
use crate::resync::resynchronize;
use crate::store::CaseStore;
use crate::workspace::WorkspaceCases;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub store: CaseStore,
    pub mutator: Mutator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let mutator =
            Mutator::new().with_default_failure_message(config.default_failure_message.clone());
        Self {
            config,
            workspace: None,
            db: None,
            store: CaseStore::new(),
            mutator,
        }
    }

    /// Opens (or creates) the workspace at `path` and loads its cases.
    /// The previous workspace stays selected if anything fails.
    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<usize> {
        let conn = db::open_db(&path)?;

        let mut mutator = Mutator::new()
            .with_default_failure_message(self.config.default_failure_message.clone());
        if let Some(message) = db::settings_get_json(&conn, SETTING_DEFAULT_FAILURE_MESSAGE)?
            .as_ref()
            .and_then(|v| v.as_str())
        {
            mutator.set_default_failure_message(message);
        }

        let mut store = CaseStore::new();
        let count = resynchronize(&mut store, &mut WorkspaceCases::new(&conn))?;

        self.close_workspace();
        tracing::info!(workspace = %path.display(), cases = count, "workspace selected");
        self.workspace = Some(path);
        self.db = Some(conn);
        self.store = store;
        self.mutator = mutator;
        Ok(count)
    }

    /// Drops the workspace connection and detaches the store that mirrored it.
    pub fn close_workspace(&mut self) {
        self.store.detach();
        self.store = CaseStore::new();
        self.mutator = Mutator::new()
            .with_default_failure_message(self.config.default_failure_message.clone());
        self.db = None;
        if let Some(path) = self.workspace.take() {
            tracing::info!(workspace = %path.display(), "workspace closed");
        }
    }
}
