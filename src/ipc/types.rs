use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::DaemonConfig;
use crate::db::SqliteStore;
use crate::session::{Session, User};
use crate::store::{bootstrap_admin, MemoryStore, Store};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub store: Box<dyn Store>,
    pub session: Option<Session>,
}

impl AppState {
    /// Starts on an in-memory store seeded with the bootstrap admin.
    pub fn new(config: DaemonConfig) -> anyhow::Result<Self> {
        let mut store = MemoryStore::new();
        bootstrap_admin(&mut store, &config.admin_email)?;
        Ok(Self {
            config,
            workspace: None,
            store: Box::new(store),
            session: None,
        })
    }

    /// Switches to the SQLite store under `path`. The session ends because
    /// user ids belong to the store they came from.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<Option<User>> {
        let mut store = SqliteStore::open(path)?;
        let created = bootstrap_admin(&mut store, &self.config.admin_email)?;
        self.store = Box::new(store);
        self.workspace = Some(path.to_path_buf());
        self.session = None;
        Ok(created)
    }

    /// Drops the workspace connection so its database file can be replaced.
    /// The stand-in memory store gets the bootstrap admin so the daemon stays
    /// usable if no workspace can be reopened.
    pub fn release_workspace(&mut self) -> anyhow::Result<()> {
        let mut store = MemoryStore::new();
        bootstrap_admin(&mut store, &self.config.admin_email)?;
        self.store = Box::new(store);
        self.workspace = None;
        self.session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_workspace_keeps_an_admin_account() {
        let dir = std::env::temp_dir().join(format!("schoold-release-{}", crate::store::new_id()));
        let mut state = AppState::new(DaemonConfig::default()).expect("state");
        state.open_workspace(&dir).expect("open workspace");
        assert_eq!(state.store.kind(), "sqlite");

        state.release_workspace().expect("release");
        assert_eq!(state.store.kind(), "memory");
        assert!(state.workspace.is_none());
        let admin = state
            .store
            .find_user_by_email("admin@school.local")
            .expect("lookup")
            .expect("bootstrap admin");
        assert!(admin.active);

        let _ = std::fs::remove_dir_all(dir);
    }
}
