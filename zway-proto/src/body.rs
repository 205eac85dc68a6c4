//! Request/response body encoding. `spec.md` §6 describes the on-wire
//! object as "UBJSON-style"; there is no actively maintained UBJSON crate
//! in the ecosystem the sibling examples draw from, so bodies are encoded
//! as JSON via `serde_json` (already a dependency for every persisted
//! shape) — same opaque-object semantics, different byte format. See
//! `DESIGN.md` for this decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, RequestId, Result};

/// Decoded from a request packet's body. `requestType` selects the C5
/// handler; the remaining fields are handler-specific and read out of
/// `fields` by name.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestHead {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    #[serde(rename = "requestType")]
    pub request_type: u32,
    #[serde(flatten)]
    pub fields: Value,
}

/// Encoded into a response packet's body.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseHead {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    pub status: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Value,
}

impl ResponseHead {
    pub fn ok(request_id: RequestId, fields: Value) -> ResponseHead {
        ResponseHead {
            request_id,
            status: 1,
            error: None,
            fields,
        }
    }

    pub fn failed(request_id: RequestId, error: &Error) -> ResponseHead {
        ResponseHead {
            request_id,
            status: 0,
            error: Some(error.client_message()),
            fields: Value::Object(serde_json::Map::new()),
        }
    }
}

pub fn decode_request(body: &[u8]) -> Result<RequestHead> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedRequestBody(e.to_string()))
}

pub fn encode_response(head: &ResponseHead) -> Result<Vec<u8>> {
    serde_json::to_vec(head).map_err(|e| Error::MalformedRequestBody(e.to_string()))
}

/// Read a required field out of a request's flattened body. Used by every
/// C5 handler that needs a typed argument from `RequestHead::fields`.
pub fn required_field<T: for<'de> Deserialize<'de>>(fields: &Value, name: &'static str) -> Result<T> {
    fields
        .get(name)
        .cloned()
        .ok_or(Error::MissingField(name))
        .and_then(|v| serde_json::from_value(v).map_err(|_| Error::MissingField(name)))
}

/// Read an optional field, distinguishing "absent" from "present but
/// malformed" — the latter is still `None` here since most optional
/// fields in this protocol are genuinely optional preferences.
pub fn optional_field<T: for<'de> Deserialize<'de>>(fields: &Value, name: &'static str) -> Option<T> {
    fields.get(name).cloned().and_then(|v| serde_json::from_value(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_request_reads_id_and_type_and_keeps_extra_fields() {
        let body = json!({"requestId": 7, "requestType": 1000, "name": "alice"});
        let head = decode_request(&serde_json::to_vec(&body).unwrap()).unwrap();

        assert_eq!(head.request_id, RequestId(7));
        assert_eq!(head.request_type, 1000);
        assert_eq!(head.fields.get("name").unwrap(), "alice");
    }

    #[test]
    fn required_field_missing_is_missing_field_error() {
        let fields = json!({});
        let result: Result<String> = required_field(&fields, "name");
        assert!(matches!(result, Err(Error::MissingField("name"))));
    }

    #[test]
    fn response_ok_round_trips_through_json() {
        let head = ResponseHead::ok(RequestId(1), json!({"accountId": 5}));
        let bytes = encode_response(&head).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["status"], 1);
        assert_eq!(value["accountId"], 5);
    }
}
