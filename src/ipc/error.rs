use crate::error::ServiceError;
use crate::xml::XmlError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Map a core failure onto the error envelope. Parse and storage failures
/// keep a fixed message and carry the underlying reason in `details`.
pub fn service_err(id: &str, e: &ServiceError) -> serde_json::Value {
    match e {
        ServiceError::MalformedInput(XmlError::Syntax(reason)) => err(
            id,
            e.code(),
            "Failed to parse XML",
            Some(json!({ "reason": reason })),
        ),
        ServiceError::MalformedInput(inner) => err(id, e.code(), inner.to_string(), None),
        ServiceError::StorageFailure(inner) => err(
            id,
            e.code(),
            "Storage failure",
            Some(json!({ "reason": inner.to_string() })),
        ),
        ServiceError::TestNotFound(test_id) | ServiceError::NoResultsFound(test_id) => err(
            id,
            e.code(),
            e.to_string(),
            Some(json!({ "testId": test_id })),
        ),
    }
}
