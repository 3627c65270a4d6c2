mod backup;
mod calc;
mod config;
mod courses;
mod db;
mod filters;
mod ipc;
mod logging;
mod schedule;
mod session;
mod store;
mod timeline;

use anyhow::Context as _;
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    logging::init()?;

    let config = config::DaemonConfig::from_env();
    let startup_workspace = config.workspace.clone();
    let mut state = ipc::AppState::new(config).context("initialize in-memory store")?;
    if let Some(path) = startup_workspace {
        state
            .open_workspace(&path)
            .with_context(|| format!("open workspace {}", path.display()))?;
        tracing::info!(path = %path.display(), "startup workspace opened");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable request line");
                let _ = writeln!(stdout, "{}", ipc::bad_line(e.to_string()));
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
