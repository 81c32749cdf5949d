use serde_json::{json, Value};

pub fn ok(id: &str, result: Value) -> Value {
    json!({ "id": id, "ok": true, "result": result })
}

pub fn err(id: &str, code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.into() });
    if let Some(details) = details {
        error["details"] = details;
    }
    json!({ "id": id, "ok": false, "error": error })
}
