mod extract;
mod grid;
mod ipc;
mod layout;
mod merge;
mod promotion;
mod ranking;
mod record;
mod storage;
mod store;
mod visibility;

use serde_json::json;
use std::io::{self, BufRead, Write};

// One request per stdin line, one response per stdout line. State lives
// for the life of the process; the workspace is selected over IPC.
fn main() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // Undecodable input has no id to echo back.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };
        let _ = writeln!(stdout, "{resp}");
        let _ = stdout.flush();
    }
}
