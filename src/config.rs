use std::path::PathBuf;

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@school.local";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Workspace opened before the first request is read.
    pub workspace: Option<PathBuf>,
    /// Email of the admin account created in a store that has no users.
    pub admin_email: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            workspace: non_blank("SCHOOLD_WORKSPACE").map(PathBuf::from),
            admin_email: non_blank("SCHOOLD_ADMIN_EMAIL")
                .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string()),
        }
    }
}
