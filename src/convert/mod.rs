//! # Domain Values and Conversion
//!
//! [`FieldValue`] is the typed, domain-side value an entity field holds.
//! Native kinds (bool, int, float, text) map straight onto store primitives;
//! everything else is serialized down to a string by a converter registered
//! in the [`ConversionService`] — and deserialized back on read.
//!
//! Converters are looked up per declared value kind. A missing converter is
//! not a startup error: the field simply fails with `ConversionFailure` on
//! its first access.

use chrono::{DateTime, SecondsFormat, Utc};
use hashbrown::HashMap;
use std::sync::Arc;

use crate::model::{NodeId, Value};
use crate::schema::ValueKind;
use crate::{Error, Result};

// ============================================================================
// FieldValue
// ============================================================================

/// A typed value as the application sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    /// A to-one entity reference.
    Ref(NodeId),
    /// A to-many entity reference.
    Refs(Vec<NodeId>),
    /// A value of an application-defined kind, carried as a JSON document.
    Custom {
        kind: String,
        data: serde_json::Value,
    },
}

impl FieldValue {
    pub fn custom(kind: impl Into<String>, data: serde_json::Value) -> Self {
        FieldValue::Custom {
            kind: kind.into(),
            data,
        }
    }

    /// Whether this value is admissible for a field declared with `kind`.
    pub fn matches_kind(&self, kind: &ValueKind) -> bool {
        match (self, kind) {
            (FieldValue::Bool(_), ValueKind::Bool)
            | (FieldValue::Int(_), ValueKind::Int)
            | (FieldValue::Float(_), ValueKind::Float)
            | (FieldValue::Text(_), ValueKind::Text)
            | (FieldValue::DateTime(_), ValueKind::DateTime) => true,
            (FieldValue::Custom { kind: k, .. }, ValueKind::Custom(declared)) => k == declared,
            _ => false,
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Ref(_) => "entity reference",
            FieldValue::Refs(_) => "entity references",
            FieldValue::Custom { kind, .. } => kind,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            FieldValue::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}
impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}
impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}
impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}
impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}
impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_owned())
    }
}
impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::DateTime(v)
    }
}
impl From<NodeId> for FieldValue {
    fn from(v: NodeId) -> Self {
        FieldValue::Ref(v)
    }
}
impl From<Vec<NodeId>> for FieldValue {
    fn from(v: Vec<NodeId>) -> Self {
        FieldValue::Refs(v)
    }
}

// ============================================================================
// Converters
// ============================================================================

/// Which way a conversion runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertDirection {
    /// Domain value → store primitive.
    ToStore,
    /// Store primitive → domain value.
    FromStore,
}

/// Converts values of one declared kind to and from store primitives.
///
/// Converters are immutable and shared; they must not hold per-entity state.
pub trait ValueConverter: Send + Sync {
    /// Whether this converter supports the given direction. Both directions
    /// must be supported for a field to be handled by the converting
    /// accessor at all.
    fn converts(&self, _direction: ConvertDirection) -> bool {
        true
    }

    fn to_store(&self, value: &FieldValue) -> Result<Value>;

    fn from_store(&self, raw: &Value) -> Result<FieldValue>;
}

/// Registry of converters, keyed by declared value kind.
#[derive(Default)]
pub struct ConversionService {
    converters: HashMap<String, Arc<dyn ValueConverter>>,
}

impl ConversionService {
    /// An empty service: only native kinds are storable.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service with the built-in converters registered (datetime).
    pub fn with_defaults() -> Self {
        let mut service = Self::new();
        service.register(ValueKind::DateTime, Arc::new(Rfc3339Converter));
        service
    }

    pub fn register(&mut self, kind: ValueKind, converter: Arc<dyn ValueConverter>) {
        self.converters.insert(kind.name().to_string(), converter);
    }

    /// Register the JSON document converter for an application-defined kind.
    pub fn register_json(&mut self, kind: impl Into<String>) {
        let kind = kind.into();
        self.converters
            .insert(kind.clone(), Arc::new(JsonConverter { kind }));
    }

    /// Whether a conversion is available for the kind in the given direction.
    /// Native kinds need no conversion and always report `false` here.
    pub fn can_convert(&self, kind: &ValueKind, direction: ConvertDirection) -> bool {
        self.converters
            .get(kind.name())
            .is_some_and(|c| c.converts(direction))
    }

    pub fn to_store(&self, field: &str, kind: &ValueKind, value: &FieldValue) -> Result<Value> {
        self.converter_for(field, kind, ConvertDirection::ToStore)?
            .to_store(value)
    }

    pub fn from_store(&self, field: &str, kind: &ValueKind, raw: &Value) -> Result<FieldValue> {
        self.converter_for(field, kind, ConvertDirection::FromStore)?
            .from_store(raw)
    }

    fn converter_for(
        &self,
        field: &str,
        kind: &ValueKind,
        direction: ConvertDirection,
    ) -> Result<&Arc<dyn ValueConverter>> {
        self.converters
            .get(kind.name())
            .filter(|c| c.converts(direction))
            .ok_or_else(|| Error::ConversionFailure {
                field: field.to_string(),
                detail: format!(
                    "no converter registered for kind `{}` ({})",
                    kind.name(),
                    match direction {
                        ConvertDirection::ToStore => "to store primitive",
                        ConvertDirection::FromStore => "from store primitive",
                    }
                ),
            })
    }
}

// ============================================================================
// Built-in converters
// ============================================================================

/// Stores timestamps as RFC 3339 strings with nanosecond precision.
pub struct Rfc3339Converter;

impl ValueConverter for Rfc3339Converter {
    fn to_store(&self, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::DateTime(dt) => Ok(Value::String(
                dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            )),
            other => Err(conversion_detail(format!(
                "expected a datetime, got {}",
                other.describe()
            ))),
        }
    }

    fn from_store(&self, raw: &Value) -> Result<FieldValue> {
        let text = raw
            .as_str()
            .ok_or_else(|| conversion_detail(format!("expected a string, got {}", raw.type_name())))?;
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|e| conversion_detail(format!("`{text}` is not RFC 3339: {e}")))?;
        Ok(FieldValue::DateTime(parsed.with_timezone(&Utc)))
    }
}

/// Stores custom-kind values as compact JSON strings.
pub struct JsonConverter {
    kind: String,
}

impl JsonConverter {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl ValueConverter for JsonConverter {
    fn to_store(&self, value: &FieldValue) -> Result<Value> {
        match value {
            FieldValue::Custom { data, .. } => {
                let text = serde_json::to_string(data)
                    .map_err(|e| conversion_detail(format!("serialization failed: {e}")))?;
                Ok(Value::String(text))
            }
            other => Err(conversion_detail(format!(
                "expected a `{}` value, got {}",
                self.kind,
                other.describe()
            ))),
        }
    }

    fn from_store(&self, raw: &Value) -> Result<FieldValue> {
        let text = raw
            .as_str()
            .ok_or_else(|| conversion_detail(format!("expected a string, got {}", raw.type_name())))?;
        let data = serde_json::from_str(text)
            .map_err(|e| conversion_detail(format!("`{text}` is not valid JSON: {e}")))?;
        Ok(FieldValue::Custom {
            kind: self.kind.clone(),
            data,
        })
    }
}

// Converter errors surface without a field name; the accessor that called the
// service rewraps them with its own.
fn conversion_detail(detail: String) -> Error {
    Error::ConversionFailure {
        field: String::new(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_datetime_round_trip() {
        let service = ConversionService::with_defaults();
        let dt = Utc.with_ymd_and_hms(2021, 9, 13, 8, 30, 0).unwrap();

        let raw = service
            .to_store("born", &ValueKind::DateTime, &FieldValue::DateTime(dt))
            .unwrap();
        assert!(matches!(raw, Value::String(_)));

        let back = service.from_store("born", &ValueKind::DateTime, &raw).unwrap();
        assert_eq!(back, FieldValue::DateTime(dt));
    }

    #[test]
    fn test_datetime_rejects_garbage() {
        let service = ConversionService::with_defaults();
        let err = service
            .from_store("born", &ValueKind::DateTime, &Value::from("yesterday"))
            .unwrap_err();
        assert!(matches!(err, Error::ConversionFailure { .. }));
    }

    #[test]
    fn test_json_round_trip() {
        let mut service = ConversionService::new();
        service.register_json("temperature");

        let kind = ValueKind::Custom("temperature".into());
        let value = FieldValue::custom("temperature", serde_json::json!({"celsius": 21.5}));

        let raw = service.to_store("reading", &kind, &value).unwrap();
        let back = service.from_store("reading", &kind, &raw).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_missing_converter_reports_kind_and_direction() {
        let service = ConversionService::new();
        let kind = ValueKind::Custom("mood".into());

        let err = service
            .to_store("mood", &kind, &FieldValue::custom("mood", serde_json::json!("sunny")))
            .unwrap_err();
        match err {
            Error::ConversionFailure { detail, .. } => {
                assert!(detail.contains("mood"));
                assert!(detail.contains("to store"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_can_convert_directions() {
        struct OneWay;
        impl ValueConverter for OneWay {
            fn converts(&self, direction: ConvertDirection) -> bool {
                direction == ConvertDirection::ToStore
            }
            fn to_store(&self, _: &FieldValue) -> Result<Value> {
                Ok(Value::from("x"))
            }
            fn from_store(&self, _: &Value) -> Result<FieldValue> {
                unreachable!()
            }
        }

        let mut service = ConversionService::new();
        let kind = ValueKind::Custom("oneway".into());
        service.register(kind.clone(), Arc::new(OneWay));

        assert!(service.can_convert(&kind, ConvertDirection::ToStore));
        assert!(!service.can_convert(&kind, ConvertDirection::FromStore));
        assert!(!service.can_convert(&ValueKind::Text, ConvertDirection::ToStore));
    }
}
