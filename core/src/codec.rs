//! Casting parameter values to the strings sent in query parameters.
//!
//! [`DefaultCast`] is the generic stringification the discovery client uses
//! for declared parameter types. [`JsonParameterCodec`] layers on top of it
//! so that structured values for `object`/`array` parameters are sent as
//! JSON, which is what the API server expects for filters, orderings, and
//! similar parameters.

use serde_json::Value;

/// Converts one parameter value to its wire string given its schema type.
pub trait ParameterCodec: Send + Sync {
    fn cast(&self, value: &Value, schema_type: &str) -> String;
}

/// Generic stringification by declared schema type.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCast;

impl ParameterCodec for DefaultCast {
    fn cast(&self, value: &Value, schema_type: &str) -> String {
        if let Value::String(s) = value {
            return match schema_type {
                "integer" => s
                    .trim()
                    .parse::<f64>()
                    .map(|n| (n.trunc() as i64).to_string())
                    .unwrap_or_else(|_| s.clone()),
                _ => s.clone(),
            };
        }
        match schema_type {
            "integer" => match value {
                Value::Number(n) => n
                    .as_i64()
                    .map(|i| i.to_string())
                    .or_else(|| n.as_u64().map(|u| u.to_string()))
                    .or_else(|| n.as_f64().map(|f| (f.trunc() as i64).to_string()))
                    .unwrap_or_else(|| n.to_string()),
                Value::Bool(b) => u8::from(*b).to_string(),
                other => plain_text(other),
            },
            "number" => match value {
                Value::Number(n) => n.as_f64().map(format_float).unwrap_or_else(|| n.to_string()),
                other => plain_text(other),
            },
            "boolean" => truthy(value).to_string(),
            _ => plain_text(value),
        }
    }
}

/// JSON-encodes structured values for `object` and `array` parameters,
/// deferring everything else to an inner cast.
#[derive(Debug, Clone, Default)]
pub struct JsonParameterCodec<C = DefaultCast> {
    inner: C,
}

impl<C: ParameterCodec> JsonParameterCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Parse a string produced by [`ParameterCodec::cast`] for a structured
    /// parameter back into a value.
    pub fn decode(encoded: &str) -> serde_json::Result<Value> {
        serde_json::from_str(encoded)
    }
}

impl<C: ParameterCodec> ParameterCodec for JsonParameterCodec<C> {
    fn cast(&self, value: &Value, schema_type: &str) -> String {
        if !value.is_string() && matches!(schema_type, "object" | "array") {
            // serde_json maps keep keys sorted, so this is canonical.
            return value.to_string();
        }
        self.inner.cast(value, schema_type)
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Scalars as bare text, arrays comma-joined, objects as `key=value` pairs.
fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(plain_text).collect::<Vec<_>>().join(","),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", plain_text(v)))
            .collect::<Vec<_>>()
            .join(","),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> JsonParameterCodec {
        JsonParameterCodec::default()
    }

    #[test]
    fn filters_array_is_sent_as_json() {
        let filters = json!([["owner_uuid", "=", "zzzzz-tpzed-000000000000000"]]);
        assert_eq!(
            codec().cast(&filters, "array"),
            r#"[["owner_uuid","=","zzzzz-tpzed-000000000000000"]]"#
        );
    }

    #[test]
    fn object_keys_are_canonically_ordered() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": null}});
        assert_eq!(codec().cast(&value, "object"), r#"{"a":{"c":null,"d":[1,2]},"b":1}"#);
    }

    #[test]
    fn structured_values_round_trip() {
        let values = [
            json!({"name": "x", "props": {"k": [1, 2.5, "three", true, null]}}),
            json!([]),
            json!({}),
            json!([{"nested": {"deeper": ["a=b", "c,d"]}}]),
        ];
        for value in values {
            for schema_type in ["object", "array"] {
                let encoded = codec().cast(&value, schema_type);
                assert_eq!(JsonParameterCodec::<DefaultCast>::decode(&encoded).unwrap(), value);
            }
        }
    }

    #[test]
    fn strings_pass_through_unchanged() {
        let already_encoded = json!(r#"[["uuid","=","x"]]"#);
        assert_eq!(codec().cast(&already_encoded, "array"), r#"[["uuid","=","x"]]"#);
        assert_eq!(codec().cast(&json!("hello world"), "string"), "hello world");
    }

    #[test]
    fn non_structured_types_use_default_cast() {
        assert_eq!(codec().cast(&json!(42), "integer"), "42");
        assert_eq!(codec().cast(&json!(3.9), "integer"), "3");
        assert_eq!(codec().cast(&json!(2), "number"), "2.0");
        assert_eq!(codec().cast(&json!(2.5), "number"), "2.5");
        assert_eq!(codec().cast(&json!(true), "boolean"), "true");
        assert_eq!(codec().cast(&json!(0), "boolean"), "false");
        assert_eq!(codec().cast(&json!(7), "string"), "7");
    }

    #[test]
    fn default_cast_flattens_structured_values() {
        assert_eq!(DefaultCast.cast(&json!(["a", "b", 3]), "array"), "a,b,3");
        assert_eq!(DefaultCast.cast(&json!({"a": 1, "b": "x"}), "object"), "a=1,b=x");
    }

    #[test]
    fn default_cast_parses_integer_strings() {
        assert_eq!(DefaultCast.cast(&json!("12"), "integer"), "12");
        assert_eq!(DefaultCast.cast(&json!("not a number"), "integer"), "not a number");
    }

    mod round_trip {
        use proptest::prelude::*;

        use super::*;

        fn arb_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                // Quarter steps print and parse back exactly.
                any::<i32>().prop_map(|n| Value::from(f64::from(n) / 4.0)),
                ".{0,12}".prop_map(Value::String),
            ];
            leaf.prop_recursive(4, 48, 6, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                    prop::collection::btree_map(".{0,8}", inner, 0..6)
                        .prop_map(|map| Value::Object(map.into_iter().collect())),
                ]
            })
        }

        fn arb_structured() -> impl Strategy<Value = (Value, &'static str)> {
            prop_oneof![
                prop::collection::vec(arb_value(), 0..6).prop_map(|items| (Value::Array(items), "array")),
                prop::collection::btree_map(".{0,8}", arb_value(), 0..6)
                    .prop_map(|map| (Value::Object(map.into_iter().collect()), "object")),
            ]
        }

        proptest! {
            #[test]
            fn structured_values_decode_to_themselves((value, schema_type) in arb_structured()) {
                let encoded = codec().cast(&value, schema_type);
                let decoded = JsonParameterCodec::<DefaultCast>::decode(&encoded).unwrap();
                prop_assert_eq!(decoded, value);
            }

            #[test]
            fn string_values_pass_through(text in ".{0,32}", schema_type in "(string|object|array)") {
                prop_assert_eq!(codec().cast(&Value::String(text.clone()), &schema_type), text);
            }
        }
    }
}
