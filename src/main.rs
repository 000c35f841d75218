mod backup;
mod cases;
mod config;
mod db;
mod ipc;
mod mutator;
mod remote;
mod resync;
mod store;
mod workspace;

use std::io::{self, BufRead, Write};

fn main() {
    let config = config::Config::from_env();
    config::init_logging(&config);

    let mut state = ipc::AppState::new(config.clone());
    if let Some(path) = config.workspace.clone() {
        // Startup workspace is a convenience; the UI can still select one later.
        if let Err(e) = state.open_workspace(path.clone()) {
            tracing::error!(workspace = %path.display(), error = %format!("{e:#}"), "failed to open startup workspace");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = req.id.as_str(), method = req.method.as_str(), "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
