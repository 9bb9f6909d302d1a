//! Scalar annotations attached to published messages as AMQP headers.

use std::collections::BTreeMap;

use serde_json::Value;

/// A header value. Only scalars are carried.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

pub type Annotations = BTreeMap<String, AnnotationValue>;

/// Collect the top-level scalar fields of a serialized message.
///
/// Objects, arrays and nulls are skipped. A non-object value yields no
/// annotations.
pub fn annotate(value: &Value) -> Annotations {
    let Some(fields) = value.as_object() else {
        return Annotations::new();
    };

    fields
        .iter()
        .filter_map(|(key, value)| scalar(value).map(|v| (key.clone(), v)))
        .collect()
}

fn scalar(value: &Value) -> Option<AnnotationValue> {
    match value {
        Value::String(s) => Some(AnnotationValue::Text(s.clone())),
        Value::Bool(b) => Some(AnnotationValue::Flag(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(AnnotationValue::Integer)
            .or_else(|| n.as_f64().map(AnnotationValue::Float)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
