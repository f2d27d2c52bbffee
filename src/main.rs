mod attendance;
mod calc;
mod config;
mod datekey;
mod db;
mod directory;
mod error;
mod ipc;
mod logging;
mod marks;
mod reports;
mod settings;
mod tenant;
#[cfg(test)]
mod test_support;

use std::io::{self, BufRead, Write};

use log::{error, warn};

fn main() {
    let cfg = match config::ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("recordsd: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init_logging(&cfg.log_level, cfg.log_dir.as_deref()) {
        eprintln!("recordsd: {e}");
        std::process::exit(2);
    }

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = cfg.workspace.clone() {
        // A bad preconfigured workspace leaves the daemon up; workspace.select can recover.
        let _ = ipc::select_workspace(&mut state, path);
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                error!("event=stdin_read module=main status=failed error={e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                warn!("event=request_failed module=main status=400 code=bad_json error={e}");
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
                    .unwrap_or_default();
                ipc::err(&id, 400, "bad_json", e.to_string(), None)
            }
        };

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
