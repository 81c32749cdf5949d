use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ranking;
use crate::record::is_semester_code;
use crate::store::{self, StoreError};
use crate::visibility;
use serde_json::json;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn matricule_param(req: &Request) -> Result<i64, serde_json::Value> {
    req.params
        .get("matricule")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", "missing params.matricule", None))
}

/// Store failures carry their own IPC code; everything else is plumbing.
fn store_err_response(id: &str, e: anyhow::Error) -> serde_json::Value {
    match e.downcast_ref::<StoreError>() {
        Some(StoreError::RecordNotFound(_)) => err(id, "not_found", e.to_string(), None),
        Some(StoreError::MergeConflict(_)) => err(id, "merge_conflict", e.to_string(), None),
        None => err(id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let matricule = match matricule_param(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    match store::get_record(conn, matricule) {
        Ok(Some(record)) => match serde_json::to_value(&record) {
            Ok(doc) => ok(&req.id, json!({ "record": doc })),
            Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
        },
        Ok(None) => err(
            &req.id,
            "not_found",
            format!("no record for matricule {matricule}"),
            None,
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let filters = match ranking::parse_stats_filters(&req.params) {
        Ok(f) => f,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let records = match store::scan_records(conn) {
        Ok(records) => records,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let selected = ranking::filter_records(&records, &filters);
    match serde_json::to_value(&selected) {
        Ok(docs) => ok(&req.id, json!({ "records": docs, "total": selected.len() })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_set_semester_visibility(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let matricule = match matricule_param(req) {
        Ok(m) => m,
        Err(resp) => return resp,
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
    let Some(is_public) = req.params.get("isPublic").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing params.isPublic", None);
    };

    match store::set_semester_visibility(conn, matricule, semester, is_public, &now_rfc3339()) {
        Ok(()) => ok(
            &req.id,
            json!({ "matricule": matricule, "semester": semester, "isPublic": is_public }),
        ),
        Err(e) => store_err_response(&req.id, e),
    }
}

fn handle_set_global_visibility(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let matricule = match matricule_param(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };
    let Some(is_public) = req.params.get("isPublic").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing params.isPublic", None);
    };

    match store::set_global_visibility(conn, matricule, is_public, &now_rfc3339()) {
        Ok(()) => ok(
            &req.id,
            json!({ "matricule": matricule, "isPublicGlobale": is_public }),
        ),
        Err(e) => store_err_response(&req.id, e),
    }
}

fn handle_projection(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let matricule = match matricule_param(req) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    let record = match store::get_record(conn, matricule) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                format!("no record for matricule {matricule}"),
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The cohort snapshot is only needed when ranks will be exposed.
    let cohort = if record.is_public_globale {
        match store::scan_records(conn) {
            Ok(records) => records,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    } else {
        Vec::new()
    };

    let projection = visibility::project(&record, &cohort);
    match serde_json::to_value(&projection) {
        Ok(doc) => ok(&req.id, json!({ "projection": doc })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.get" => Some(handle_get(state, req)),
        "records.list" => Some(handle_list(state, req)),
        "records.setSemesterVisibility" => Some(handle_set_semester_visibility(state, req)),
        "records.setGlobalVisibility" => Some(handle_set_global_visibility(state, req)),
        "records.projection" => Some(handle_projection(state, req)),
        _ => None,
    }
}
