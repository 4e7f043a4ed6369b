mod authz;
mod config;
mod db;
mod error;
mod grading;
mod ipc;
mod skills;
mod store;

use std::io::{self, BufRead, Write};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(cfg: &config::DaemonConfig) {
    let filter = EnvFilter::try_new(&cfg.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let cfg = config::DaemonConfig::from_env();
    init_tracing(&cfg);

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_ref() {
        if let Err(e) = state.open_workspace(path) {
            error!(workspace = %path.display(), error = %e, "could not open configured workspace");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "gradebookd ready");

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
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
                );
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
    info!("stdin closed; exiting");
}
