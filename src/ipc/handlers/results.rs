use crate::ids::NumericId;
use crate::ipc::error::{err, ok, service_err};
use crate::ipc::types::{AppState, Request};
use crate::{calc, import, xml};
use serde_json::json;

/// Batch text comes inline (`xml`) or from a file (`xmlPath`).
fn batch_text(req: &Request) -> Result<String, serde_json::Value> {
    if let Some(v) = req.params.get("xml") {
        let Some(s) = v.as_str() else {
            return Err(err(&req.id, "bad_params", "params.xml must be a string", None));
        };
        return Ok(s.to_string());
    }
    if let Some(v) = req.params.get("xmlPath") {
        let Some(path) = v.as_str() else {
            return Err(err(&req.id, "bad_params", "params.xmlPath must be a string", None));
        };
        return std::fs::read_to_string(path).map_err(|e| {
            err(
                &req.id,
                "read_failed",
                e.to_string(),
                Some(json!({ "xmlPath": path })),
            )
        });
    }
    Ok(String::new())
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let text = match batch_text(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    if text.trim().is_empty() {
        tracing::error!("no data received to import");
        return err(&req.id, "no_data", "No data received to import", None);
    }

    let records = match xml::parse_results_xml(&text) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse xml for import");
            return service_err(&req.id, &e.into());
        }
    };
    tracing::info!(records = records.len(), "parsed xml data for import");

    match import::reconcile(conn, &records) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "message": "Records upserted successfully",
                "processedRecords": summary.processed_records,
            }),
        ),
        Err(e) => service_err(&req.id, &e),
    }
}

/// Accepts a string for any size of id; JSON numbers only while they fit
/// in 64 bits.
fn param_test_id(req: &Request) -> Result<NumericId, String> {
    match req.params.get("testId") {
        Some(serde_json::Value::String(s)) => s.parse().map_err(|e| format!("testId: {e}")),
        Some(serde_json::Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                Ok(NumericId::from(u))
            } else if let Some(i) = n.as_i64() {
                Ok(NumericId::from(i))
            } else {
                Err("testId must be an integer (send large ids as strings)".to_string())
            }
        }
        Some(_) => Err("testId must be a string or integer".to_string()),
        None => Err("missing params.testId".to_string()),
    }
}

fn handle_aggregate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let test_id = match param_test_id(req) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    match calc::aggregate(conn, &test_id) {
        Ok(stats) => ok(&req.id, json!(stats)),
        Err(e) => service_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.import" => Some(handle_import(state, req)),
        "results.aggregate" => Some(handle_aggregate(state, req)),
        _ => None,
    }
}
