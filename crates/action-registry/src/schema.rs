//! Closed parameter schemas and structural validation of untrusted payloads.

use std::fmt;

use schemars::schema::{
    InstanceType, Metadata, NumberValidation, ObjectValidation, Schema, SchemaObject,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// Index into the current observation's selector map.
    ElementIndex,
    /// Absolute URL.
    Url,
    Enum(Vec<String>),
}

impl ParamKind {
    fn label(&self) -> String {
        match self {
            ParamKind::String => "string".into(),
            ParamKind::Integer => "integer".into(),
            ParamKind::Number => "number".into(),
            ParamKind::Boolean => "boolean".into(),
            ParamKind::ElementIndex => "element index".into(),
            ParamKind::Url => "absolute url".into(),
            ParamKind::Enum(values) => format!("one of {}", values.join("|")),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::ElementIndex => value
                .as_u64()
                .map(|v| v <= u64::from(u32::MAX))
                .unwrap_or(false),
            ParamKind::Url => value
                .as_str()
                .map(|raw| url::Url::parse(raw).is_ok())
                .unwrap_or(false),
            ParamKind::Enum(values) => value
                .as_str()
                .map(|raw| values.iter().any(|v| v == raw))
                .unwrap_or(false),
        }
    }

    fn schema(&self) -> SchemaObject {
        let mut schema = SchemaObject::default();
        match self {
            ParamKind::String => schema.instance_type = Some(InstanceType::String.into()),
            ParamKind::Integer => schema.instance_type = Some(InstanceType::Integer.into()),
            ParamKind::Number => schema.instance_type = Some(InstanceType::Number.into()),
            ParamKind::Boolean => schema.instance_type = Some(InstanceType::Boolean.into()),
            ParamKind::ElementIndex => {
                schema.instance_type = Some(InstanceType::Integer.into());
                schema.number = Some(Box::new(NumberValidation {
                    minimum: Some(0.0),
                    ..Default::default()
                }));
            }
            ParamKind::Url => {
                schema.instance_type = Some(InstanceType::String.into());
                schema.format = Some("uri".into());
            }
            ParamKind::Enum(values) => {
                schema.instance_type = Some(InstanceType::String.into());
                schema.enum_values = Some(values.iter().cloned().map(Value::String).collect());
            }
        }
        schema
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamField {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

impl ParamField {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// One problem with one field of a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl FieldIssue {
    fn new(field: &str, problem: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.field, self.problem)
    }
}

/// Ordered, closed set of parameters an action accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSchema {
    fields: Vec<ParamField>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: ParamField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ParamField] {
        &self.fields
    }

    /// The single field naming an element, if the action targets one.
    pub fn element_field(&self) -> Option<&ParamField> {
        self.fields
            .iter()
            .find(|field| field.kind == ParamKind::ElementIndex)
    }

    /// Shape problems that make the schema itself unusable.
    pub(crate) fn defects(&self) -> Vec<String> {
        let mut defects = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                defects.push("empty field name".to_string());
            }
            if !seen.insert(field.name.as_str()) {
                defects.push(format!("field `{}` declared twice", field.name));
            }
            if let ParamKind::Enum(values) = &field.kind {
                if values.is_empty() {
                    defects.push(format!("enum field `{}` has no values", field.name));
                }
            }
        }
        let element_fields = self
            .fields
            .iter()
            .filter(|field| field.kind == ParamKind::ElementIndex)
            .count();
        if element_fields > 1 {
            defects.push("at most one element index field is allowed".to_string());
        }
        defects
    }

    /// Validate an untrusted payload. Every offending field is reported, not
    /// just the first. `null` is treated as an empty object, and `null` for an
    /// optional field as absent.
    pub fn validate(&self, payload: &Value) -> Result<ValidatedParams, Vec<FieldIssue>> {
        let empty = Map::new();
        let object = match payload {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(vec![FieldIssue::new(
                    "params",
                    format!("must be an object, got {}", json_type(other)),
                )])
            }
        };

        let mut issues = Vec::new();
        for key in object.keys() {
            if !self.fields.iter().any(|field| &field.name == key) {
                issues.push(FieldIssue::new(key, "is not a parameter of this action"));
            }
        }

        let mut accepted = Map::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        issues.push(FieldIssue::new(&field.name, "is required"));
                    }
                }
                Some(value) if field.kind.accepts(value) => {
                    accepted.insert(field.name.clone(), value.clone());
                }
                Some(value) => issues.push(FieldIssue::new(
                    &field.name,
                    format!("expected {}, got {}", field.kind.label(), describe(value)),
                )),
            }
        }

        if issues.is_empty() {
            Ok(ValidatedParams(accepted))
        } else {
            Err(issues)
        }
    }

    /// JSON Schema object describing the accepted payload.
    pub fn json_schema(&self) -> Value {
        let mut object = ObjectValidation::default();
        for field in &self.fields {
            let mut schema = field.kind.schema();
            schema.metadata = Some(Box::new(Metadata {
                description: Some(field.description.clone()),
                ..Default::default()
            }));
            object
                .properties
                .insert(field.name.clone(), Schema::Object(schema));
            if field.required {
                object.required.insert(field.name.clone());
            }
        }
        object.additional_properties = Some(Box::new(Schema::Bool(false)));

        let root = SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(object)),
            ..Default::default()
        };
        serde_json::to_value(root).unwrap_or_default()
    }
}

/// Parameters that passed validation. Typed getters never fail for fields
/// the schema declared with the matching kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatedParams(Map<String, Value>);

impl ValidatedParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn index(&self, name: &str) -> Option<u32> {
        self.0
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Deserialize into a handler-specific struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {:?}", s),
        Value::Number(n) => format!("number {}", n),
        other => json_type(other).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn click_like() -> ParamSchema {
        ParamSchema::new()
            .field(ParamField::required("index", ParamKind::ElementIndex, "target"))
            .field(ParamField::optional("clear", ParamKind::Boolean, "clear first"))
    }

    #[test]
    fn accepts_well_formed_payload() {
        let params = click_like().validate(&json!({"index": 3})).unwrap();
        assert_eq!(params.index("index"), Some(3));
        assert_eq!(params.bool("clear"), None);
        assert_eq!(params.as_value(), json!({"index": 3}));
    }

    #[test]
    fn reports_every_offending_field() {
        let issues = click_like()
            .validate(&json!({"index": -1, "clear": "yes", "bogus": 1}))
            .unwrap_err();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["bogus", "index", "clear"]);
    }

    #[test]
    fn missing_required_and_null_optional() {
        let issues = click_like().validate(&json!({"clear": null})).unwrap_err();
        assert_eq!(issues, vec![FieldIssue::new("index", "is required")]);
    }

    #[test]
    fn null_payload_is_empty_object() {
        assert!(ParamSchema::new().validate(&Value::Null).is_ok());
        let issues = ParamSchema::new().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(issues[0].field, "params");
    }

    #[test]
    fn enum_and_url_kinds() {
        let schema = ParamSchema::new()
            .field(ParamField::required(
                "direction",
                ParamKind::Enum(vec!["up".into(), "down".into()]),
                "",
            ))
            .field(ParamField::optional("url", ParamKind::Url, ""));
        assert!(schema.validate(&json!({"direction": "down"})).is_ok());
        assert!(schema.validate(&json!({"direction": "left"})).is_err());
        assert!(schema
            .validate(&json!({"direction": "up", "url": "not a url"}))
            .is_err());
        assert!(schema
            .validate(&json!({"direction": "up", "url": "https://a.test/x"}))
            .is_ok());
    }

    #[test]
    fn float_is_not_an_integer() {
        let schema =
            ParamSchema::new().field(ParamField::required("ms", ParamKind::Integer, ""));
        assert!(schema.validate(&json!({"ms": 1.5})).is_err());
        assert!(schema.validate(&json!({"ms": 1500})).is_ok());
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = click_like().json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["index"]));
        assert_eq!(schema["properties"]["index"]["type"], "integer");
        assert_eq!(schema["properties"]["index"]["minimum"], json!(0.0));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn schema_defects() {
        let twice = ParamSchema::new()
            .field(ParamField::required("a", ParamKind::String, ""))
            .field(ParamField::required("a", ParamKind::String, ""));
        assert_eq!(twice.defects().len(), 1);
        let two_targets = ParamSchema::new()
            .field(ParamField::required("a", ParamKind::ElementIndex, ""))
            .field(ParamField::required("b", ParamKind::ElementIndex, ""));
        assert_eq!(two_targets.defects().len(), 1);
    }
}
