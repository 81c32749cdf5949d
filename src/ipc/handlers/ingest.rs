use crate::grid::Grid;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::record::{is_academic_year, is_semester_code};
use crate::{extract, layout, merge, storage, store};
use serde_json::json;
use uuid::Uuid;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn parse_grid(raw: &serde_json::Value) -> Result<Grid, String> {
    let Some(rows) = raw.as_array() else {
        return Err("grid must be an array of rows".to_string());
    };
    let mut out: Vec<Vec<serde_json::Value>> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(cells) = row.as_array() else {
            return Err(format!("grid row {i} is not an array"));
        };
        out.push(cells.clone());
    }
    Ok(Grid::new(out))
}

fn handle_sheets_ingest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(year) = req.params.get("year").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.year", None);
    };
    if !is_academic_year(year) {
        return err(
            &req.id,
            "bad_params",
            "year must be in format YYYY-YYYY",
            Some(json!({ "year": year })),
        );
    }
    let Some(raw_grid) = req.params.get("grid") else {
        return err(&req.id, "bad_params", "missing params.grid", None);
    };
    let grid = match parse_grid(raw_grid) {
        Ok(g) => g,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let sheet = match layout::detect(&grid) {
        Ok(sheet) => sheet,
        Err(e) => return err(&req.id, "bad_layout", e.to_string(), None),
    };

    let now = now_rfc3339();
    let students = extract::extract(&grid, &sheet, year);
    let outcome = merge::ingest_students(conn, &students, &now);

    let mut result = json!({
        "semester": sheet.semester,
        "outcome": outcome,
    });

    // Keep the raw sheet around when the caller names it.
    if let Some(filename) = req.params.get("filename").and_then(|v| v.as_str()) {
        let Some(workspace) = state.workspace.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        let bytes = raw_grid.to_string().into_bytes();
        match storage::save_upload(workspace, &bytes, filename) {
            Ok(stored) => {
                let upload_id = Uuid::new_v4().to_string();
                let entry = store::UploadLog {
                    id: &upload_id,
                    filename,
                    handle: &stored.handle,
                    sha256: &stored.sha256,
                    year,
                    students_count: students.len(),
                    file_size: stored.size,
                    uploaded_at: &now,
                };
                if let Err(e) = store::log_upload(conn, &entry) {
                    return err(&req.id, "db_insert_failed", e.to_string(), None);
                }
                result["upload"] = json!({
                    "handle": stored.handle,
                    "sha256": stored.sha256,
                    "size": stored.size,
                });
            }
            Err(e) => return err(&req.id, "upload_failed", e.to_string(), None),
        }
    }

    ok(&req.id, result)
}

fn handle_semesters_retract(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(semester) = req.params.get("semester").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.semester", None);
    };
    if !is_semester_code(semester) {
        return err(
            &req.id,
            "bad_params",
            "semester must match S<number>",
            Some(json!({ "semester": semester })),
        );
    }
    let Some(year) = req.params.get("year").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.year", None);
    };
    if !is_academic_year(year) {
        return err(
            &req.id,
            "bad_params",
            "year must be in format YYYY-YYYY",
            Some(json!({ "year": year })),
        );
    }

    match store::retract_semester(conn, semester, year, &now_rfc3339()) {
        Ok(n) => ok(&req.id, json!({ "retracted": n })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_uploads_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(workspace) = state.workspace.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(handle) = req.params.get("handle").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing params.handle", None);
    };

    let file_exists = match storage::upload_exists(workspace, handle) {
        Ok(b) => b,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    // Row first, file second: a failure between the two leaves an orphan
    // file rather than a log row pointing at nothing, and a retry after a
    // partial delete still succeeds.
    let removed_rows = match conn.execute("DELETE FROM uploads WHERE handle = ?", [handle]) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if file_exists {
        if let Err(e) = storage::delete_upload(workspace, handle) {
            return err(&req.id, "upload_failed", e.to_string(), None);
        }
    } else if removed_rows == 0 {
        return err(
            &req.id,
            "not_found",
            format!("no stored upload for handle {handle}"),
            None,
        );
    }

    ok(&req.id, json!({ "handle": handle, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheets.ingest" => Some(handle_sheets_ingest(state, req)),
        "semesters.retract" => Some(handle_semesters_retract(state, req)),
        "uploads.delete" => Some(handle_uploads_delete(state, req)),
        _ => None,
    }
}
