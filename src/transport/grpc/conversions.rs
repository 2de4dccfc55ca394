//! Conversions between JSON payloads and `google.protobuf.Struct`.
//!
//! `Struct` only knows doubles, so a JSON integer sent as `993` comes back as
//! `993.0`. Comparisons downstream are numeric for that reason.

use prost_types::value::Kind;
use prost_types::{ListValue, Struct};
use serde_json::{Map, Number, Value};

/// Convert a JSON object to a `Struct`; `None` for any other JSON value.
pub fn json_to_proto_struct(value: &Value) -> Option<Struct> {
    match value {
        Value::Object(map) => Some(map_to_proto_struct(map)),
        _ => None,
    }
}

fn map_to_proto_struct(map: &Map<String, Value>) -> Struct {
    Struct {
        fields: map
            .iter()
            .map(|(k, v)| (k.clone(), json_value_to_proto_value(v)))
            .collect(),
    }
}

fn json_value_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(arr) => Kind::ListValue(ListValue {
            values: arr.iter().map(json_value_to_proto_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(map_to_proto_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}

/// Convert optional `Struct` to JSON, `null` when absent.
pub fn proto_struct_to_json_opt(s: Option<Struct>) -> Value {
    s.map(proto_struct_to_json).unwrap_or(Value::Null)
}

pub fn proto_struct_to_json(s: Struct) -> Value {
    Value::Object(
        s.fields
            .into_iter()
            .map(|(k, v)| (k, prost_value_to_json(v)))
            .collect(),
    )
}

fn prost_value_to_json(value: prost_types::Value) -> Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::NumberValue(n)) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(l)) => Value::Array(l.values.into_iter().map(prost_value_to_json).collect()),
        Some(Kind::StructValue(s)) => proto_struct_to_json(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_struct_round_trip_turns_integers_into_doubles() {
        let original = json!({
            "id": "conn",
            "setup": {"server-port": 993, "secure": true, "tags": ["a", null]}
        });
        let proto = json_to_proto_struct(&original).unwrap();
        let back = proto_struct_to_json(proto);

        assert_eq!(back["id"], "conn");
        assert_eq!(back["setup"]["server-port"].as_f64(), Some(993.0));
        assert_eq!(back["setup"]["server-port"].as_i64(), None);
        assert_eq!(back["setup"]["tags"], json!(["a", null]));
    }

    #[test]
    fn test_non_object_has_no_struct() {
        assert!(json_to_proto_struct(&json!([1, 2])).is_none());
        assert!(json_to_proto_struct(&json!("text")).is_none());
        assert_eq!(proto_struct_to_json_opt(None), Value::Null);
    }
}
