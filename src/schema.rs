//! Tool schema reflection (spec.md §4.6), Rust-adapted.
//!
//! Rust has no runtime function-signature reflection, so per spec.md §9
//! ("for languages without rich runtime type information, tools are declared
//! via a schema builder instead of a function-signature reflector"), this
//! module is a **builder**, mirroring the shape of the teacher's
//! `ToolParameter`/`ToolMetadata` builders in `tool_protocol.rs` but emitting
//! the JSON-Schema-shaped value spec.md §4.6 describes instead of the
//! teacher's flat parameter struct. For declared-record types, a
//! `schemars`-backed path stands in for "a JSON-Schema generator" (the
//! `schemars` dependency itself is pack-sourced, not from the teacher — see
//! DESIGN.md).
//!
//! The behavioral contract is preserved identically: required-unless-
//! nullable, `$defs` hoisting, hidden defaults, and "Annotated" description
//! extraction evaluated against the unwrapped inner type.

use schemars::JsonSchema;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Blanket-implemented for any `schemars::JsonSchema` type: the "declared-
/// record types that ship a JSON-Schema generator" clause of spec.md §4.6.
pub trait ToolParams: JsonSchema {
    fn json_schema_value() -> Value {
        let settings = schemars::gen::SchemaSettings::draft07();
        let generator = settings.into_generator();
        let root = generator.into_root_schema_for::<Self>();
        let mut value = serde_json::to_value(&root).unwrap_or(Value::Null);
        let mut hoisted = Map::new();
        hoist_defs(&mut value, &mut hoisted);
        if let Value::Object(obj) = &mut value {
            obj.remove("$schema");
            obj.remove("title");
            if !hoisted.is_empty() {
                obj.insert("$defs".to_string(), Value::Object(hoisted));
            }
        }
        value
    }
}

impl<T: JsonSchema> ToolParams for T {}

/// Recursively walks `value` looking for nested `$defs`/`definitions`
/// objects and merges their entries into `root_defs`, removing the nested
/// occurrence. This is the literal behavioral requirement exercised by
/// property 14 in spec.md §8 ("nested `$defs` hoisted to root").
///
/// `root_defs.entry(..).or_insert(..)` makes the hoist idempotent for
/// self-referential (recursive) record types: a definition that contains a
/// `$ref` back to itself is hoisted once and left alone on the second visit.
pub fn hoist_defs(value: &mut Value, root_defs: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for key in ["$defs", "definitions"] {
                if let Some(Value::Object(defs)) = map.remove(key) {
                    for (name, mut def) in defs {
                        if !root_defs.contains_key(&name) {
                            root_defs.insert(name.clone(), Value::Null);
                            hoist_defs(&mut def, root_defs);
                            root_defs.insert(name, def);
                        }
                    }
                }
            }
            for (_, v) in map.iter_mut() {
                hoist_defs(v, root_defs);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                hoist_defs(v, root_defs);
            }
        }
        _ => {}
    }
}

/// Sets `description` on a generated schema value, applied to the *unwrapped*
/// inner type's schema — callers must generate `T`'s schema first and pass it
/// here, never attach a description to a stale wrapper schema. This is the
/// Rust expression of "the origin is re-evaluated on the unwrapped inner
/// type" from spec.md §4.6.
pub fn describe(mut schema: Value, description: impl Into<String>) -> Value {
    if let Value::Object(obj) = &mut schema {
        obj.insert("description".to_string(), Value::String(description.into()));
    }
    schema
}

/// A primitive building block for [`ToolSchemaBuilder::param`], covering the
/// scalar/enum/array/object/map cases enumerated in spec.md §4.6.
#[derive(Clone, Debug)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// `Literal[...]` equivalent.
    Enum(Vec<String>),
    Array(Box<ParamType>),
    Object(Vec<(String, ParamType, bool)>),
    /// Arbitrary mapping type → `{"type": "object", "additionalProperties": true}`.
    AnyMap,
    /// A pre-generated schema, e.g. from [`ToolParams::json_schema_value`].
    Raw(Value),
}

impl ParamType {
    pub fn to_json(&self) -> Value {
        match self {
            ParamType::String => json!({"type": "string"}),
            ParamType::Integer => json!({"type": "integer"}),
            ParamType::Number => json!({"type": "number"}),
            ParamType::Boolean => json!({"type": "boolean"}),
            ParamType::Enum(values) => json!({"type": "string", "enum": values}),
            ParamType::Array(inner) => json!({"type": "array", "items": inner.to_json()}),
            ParamType::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (name, ty, is_required) in fields {
                    properties.insert(name.clone(), ty.to_json());
                    if *is_required {
                        required.push(Value::String(name.clone()));
                    }
                }
                json!({"type": "object", "properties": properties, "required": required})
            }
            ParamType::AnyMap => json!({"type": "object", "additionalProperties": true}),
            ParamType::Raw(v) => v.clone(),
        }
    }
}

#[derive(Clone)]
struct ParamEntry {
    name: String,
    schema: Value,
    required: bool,
    default: Option<Value>,
}

/// Errors raised at tool-registration time (never at invocation time), per
/// spec.md §4.6's "unsupported types cause the reflector to fail ... at
/// tool-registration time".
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// Builder for a tool's `parameters` JSON-Schema-shaped object.
///
/// Hidden-injection controls (`hide_default_value`/`hide_default_type`) mark
/// a parameter to be omitted from `properties`/`required` while still being
/// available to the caller/middleware for injection at invocation time — the
/// builder only affects what's reported on the wire, never what
/// `tool.func` receives (spec.md §4.6: "hidden-default" parameters).
#[derive(Default)]
pub struct ToolSchemaBuilder {
    entries: Vec<ParamEntry>,
    defs: Map<String, Value>,
    hidden_values: Vec<Value>,
    hidden_type_predicates: Vec<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
}

impl ToolSchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter built from a [`ParamType`]. `required` should be
    /// `false` whenever the field's Rust type is `Option<T>` — absence is
    /// structural in Rust, so there is no separate "absence marker" to
    /// detect, but the builder still must not propagate an unset optional
    /// parameter into `required`.
    pub fn param(mut self, name: impl Into<String>, ty: ParamType, required: bool) -> Self {
        self.entries.push(ParamEntry {
            name: name.into(),
            schema: ty.to_json(),
            required,
            default: None,
        });
        self
    }

    /// Add a parameter with an explicit description, applied after the type
    /// is resolved to its final JSON shape (never to a stale wrapper).
    pub fn described_param(self, name: impl Into<String>, ty: ParamType, required: bool, description: impl Into<String>) -> Self {
        let name = name.into();
        let schema = describe(ty.to_json(), description);
        let mut this = self;
        this.entries.push(ParamEntry { name, schema, required, default: None });
        this
    }

    /// Add a parameter whose schema comes from a declared record type
    /// implementing [`ToolParams`]. Nested `$defs` are hoisted into the
    /// builder's root defs.
    pub fn record<T: ToolParams>(mut self, name: impl Into<String>, required: bool) -> Self {
        let mut schema = T::json_schema_value();
        let mut hoisted = Map::new();
        hoist_defs(&mut schema, &mut hoisted);
        for (k, v) in hoisted {
            self.defs.entry(k).or_insert(v);
        }
        self.entries.push(ParamEntry { name: name.into(), schema, required, default: None });
        self
    }

    /// Register a parameter with a default value, participating in
    /// hidden-default filtering at `build()` time.
    pub fn param_with_default(mut self, name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        self.entries.push(ParamEntry {
            name: name.into(),
            schema: ty.to_json(),
            required: false,
            default: Some(default),
        });
        self
    }

    /// Mark a concrete default value as hidden: any parameter whose default
    /// equals `value` is omitted from `properties`/`required`.
    pub fn hide_default_value(mut self, value: Value) -> Self {
        self.hidden_values.push(value);
        self
    }

    /// Mark a default-value predicate as hidden (the "hidden default type"
    /// case — e.g. "any default that is an empty object").
    pub fn hide_default_matching(mut self, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.hidden_type_predicates.push(Arc::new(predicate));
        self
    }

    fn is_hidden(&self, entry: &ParamEntry) -> bool {
        match &entry.default {
            None => false,
            Some(d) => self.hidden_values.contains(d) || self.hidden_type_predicates.iter().any(|p| p(d)),
        }
    }

    /// Finalize into the JSON-Schema-shaped `parameters` object consumed by
    /// [`crate::tool::Tool::parameters`]. Returns `SchemaError` if any
    /// constraint can't be represented (currently: none of the builder's own
    /// constructors can produce an unsupported shape; the error path exists
    /// so future parameter kinds can fail at registration time rather than
    /// silently producing a malformed schema).
    pub fn build(self) -> Result<Value, SchemaError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for entry in &self.entries {
            if self.is_hidden(entry) {
                continue;
            }
            properties.insert(entry.name.clone(), entry.schema.clone());
            if entry.required {
                required.push(Value::String(entry.name.clone()));
            }
        }
        let mut obj = Map::new();
        obj.insert("type".to_string(), Value::String("object".to_string()));
        obj.insert("properties".to_string(), Value::Object(properties));
        obj.insert("required".to_string(), Value::Array(required));
        if !self.defs.is_empty() {
            obj.insert("$defs".to_string(), Value::Object(self.defs.clone()));
        }
        Ok(Value::Object(obj))
    }

    /// Names of parameters that will be omitted from the built schema but
    /// should still be injected at invocation time.
    pub fn hidden_param_names(&self) -> Vec<&str> {
        self.entries.iter().filter(|e| self.is_hidden(e)).map(|e| e.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[test]
    fn scalar_types_map_directly() {
        assert_eq!(ParamType::String.to_json(), json!({"type": "string"}));
        assert_eq!(ParamType::Integer.to_json(), json!({"type": "integer"}));
    }

    #[test]
    fn enum_maps_to_string_with_enum_values() {
        let schema = ParamType::Enum(vec!["a".into(), "b".into()]).to_json();
        assert_eq!(schema["type"], "string");
        assert_eq!(schema["enum"], json!(["a", "b"]));
    }

    #[test]
    fn builder_omits_unrequired_and_respects_order() {
        let schema = ToolSchemaBuilder::new()
            .param("a", ParamType::Integer, true)
            .param("b", ParamType::Integer, false)
            .build()
            .unwrap();
        let required: Vec<&str> = schema["required"].as_array().unwrap().iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(required, vec!["a"]);
        assert!(schema["properties"]["b"].is_object());
    }

    #[test]
    fn hidden_default_value_is_omitted_from_properties() {
        let schema = ToolSchemaBuilder::new()
            .param_with_default("api_key", ParamType::String, json!("__inject__"))
            .hide_default_value(json!("__inject__"))
            .build()
            .unwrap();
        assert!(schema["properties"].get("api_key").is_none());
    }

    #[test]
    fn described_param_sets_description_on_resolved_type() {
        let schema = ToolSchemaBuilder::new()
            .described_param("q", ParamType::String, false, "desc")
            .build()
            .unwrap();
        assert_eq!(schema["properties"]["q"]["description"], "desc");
        assert_eq!(schema["properties"]["q"]["type"], "string");
    }

    #[derive(JsonSchema, Serialize, Deserialize)]
    struct Inner {
        x: i64,
    }

    #[derive(JsonSchema, Serialize, Deserialize)]
    struct Outer {
        inner: Inner,
        #[serde(skip_serializing_if = "Option::is_none")]
        maybe: Option<String>,
    }

    #[test]
    fn nested_record_hoists_defs_to_root() {
        let schema = ToolSchemaBuilder::new().record::<Outer>("payload", true).build().unwrap();
        assert!(schema.get("$defs").is_some(), "expected $defs to be hoisted to root: {schema}");
    }

    #[derive(JsonSchema, Serialize, Deserialize)]
    struct Node {
        value: i64,
        children: Vec<Node>,
    }

    #[test]
    fn recursive_record_references_itself_via_ref() {
        let schema = ToolSchemaBuilder::new().record::<Node>("tree", true).build().unwrap();
        let defs = schema["$defs"].as_object().expect("expected $defs");
        assert!(!defs.is_empty());
        let serialized = serde_json::to_string(&schema).unwrap();
        assert!(serialized.contains("$ref"), "expected a $ref in: {serialized}");
    }
}
