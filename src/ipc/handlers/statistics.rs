use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ranking;
use crate::store;
use serde_json::json;

fn handle_statistics_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let stats = ranking::compute_statistics(&records, &filters);
    match serde_json::to_value(&stats) {
        Ok(doc) => ok(&req.id, doc),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rankings_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let records = match store::scan_records(conn) {
        Ok(records) => records,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let ranked = ranking::rank_cohort(&records);
    match serde_json::to_value(&ranked) {
        Ok(doc) => ok(&req.id, json!({ "rankings": doc, "total": ranked.len() })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "statistics.get" => Some(handle_statistics_get(state, req)),
        "rankings.list" => Some(handle_rankings_list(state, req)),
        _ => None,
    }
}
