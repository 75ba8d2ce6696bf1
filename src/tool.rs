//! Tool definitions and input schema reflection.
//!
//! Input schemas are derived from Rust types through [`schemars::JsonSchema`]
//! and then reduced to the structural subset every vendor accepts:
//! `type`, `properties`, `required`, `items`, `enum` and `description`.

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub description: String,
    /// JSON-Schema-shaped description of the tool arguments.
    pub input_schema: Value,
}

impl Definition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Build a definition whose input schema is reflected from `T`.
    ///
    /// ```
    /// use schemars::JsonSchema;
    /// use unichat::tool::Definition;
    ///
    /// #[derive(JsonSchema)]
    /// struct WeatherInput {
    ///     location: String,
    /// }
    ///
    /// let tool = Definition::from_type::<WeatherInput>("get_weather", "Get the weather").unwrap();
    /// assert_eq!(tool.input_schema["required"][0], "location");
    /// ```
    pub fn from_type<T: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, Error> {
        Ok(Self::new(name, description, generate_schema::<T>()?))
    }
}

/// Reflect the input schema of a struct type.
///
/// Fields are required unless they are `Option`al. Field names follow serde
/// renames. Maps, untyped JSON values and data-carrying enums are rejected
/// with [`Error::UnsupportedType`].
pub fn generate_schema<T: JsonSchema>() -> Result<Value, Error> {
    let root = serde_json::to_value(schema_for!(T))?;
    let defs = root.get("$defs").and_then(Value::as_object).cloned().unwrap_or_default();

    let mut resolver = Resolver {
        defs: &defs,
        visiting: Vec::new(),
    };
    let (schema, _) = resolver.normalize(&root)?;

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(Error::unsupported(format!(
            "tool input {} must be a struct",
            T::schema_name()
        )));
    }
    Ok(schema)
}

struct Resolver<'a> {
    defs: &'a Map<String, Value>,
    /// Definitions currently being expanded, to reject recursive types.
    visiting: Vec<String>,
}

impl Resolver<'_> {
    /// Returns the reduced schema and whether the node admits `null`.
    fn normalize(&mut self, node: &Value) -> Result<(Value, bool), Error> {
        let obj = match node {
            Value::Object(obj) => obj,
            Value::Bool(true) => return Err(Error::unsupported("arbitrary JSON value")),
            other => return Err(Error::unsupported(format!("schema node {other}"))),
        };

        let reference = obj.get("$ref").and_then(Value::as_str);
        let (mut schema, nullable) = if let Some(reference) = reference {
            self.resolve_ref(reference)?
        } else if let Some(variants) = obj.get("anyOf").or_else(|| obj.get("oneOf")) {
            self.normalize_union(variants)?
        } else if let Some(Value::Array(all)) = obj.get("allOf") {
            match all.as_slice() {
                [single] => self.normalize(single)?,
                _ => return Err(Error::unsupported("allOf composition")),
            }
        } else {
            self.normalize_typed(obj)?
        };

        if let (Some(description), Value::Object(out)) = (obj.get("description"), &mut schema) {
            out.insert("description".to_string(), description.clone());
        }
        Ok((schema, nullable))
    }

    fn resolve_ref(&mut self, reference: &str) -> Result<(Value, bool), Error> {
        let name = reference
            .strip_prefix("#/$defs/")
            .ok_or_else(|| Error::unsupported(format!("recursive type via {reference}")))?;
        if self.visiting.iter().any(|visiting| visiting == name) {
            return Err(Error::unsupported(format!("recursive type {name}")));
        }
        let target = self
            .defs
            .get(name)
            .ok_or_else(|| Error::unsupported(format!("unresolved reference {reference}")))?;

        self.visiting.push(name.to_string());
        let resolved = self.normalize(target);
        self.visiting.pop();
        resolved
    }

    /// `Option<T>` shows up as a union of `T` and `null`; anything wider is rejected.
    fn normalize_union(&mut self, variants: &Value) -> Result<(Value, bool), Error> {
        let variants = variants
            .as_array()
            .ok_or_else(|| Error::unsupported("malformed union"))?;
        let (nulls, others): (Vec<&Value>, Vec<&Value>) = variants
            .iter()
            .partition(|variant| variant.get("type").and_then(Value::as_str) == Some("null"));

        match others.as_slice() {
            [single] => {
                let (schema, nullable) = self.normalize(single)?;
                Ok((schema, nullable || !nulls.is_empty()))
            }
            _ => Err(Error::unsupported("union type")),
        }
    }

    fn normalize_typed(&mut self, obj: &Map<String, Value>) -> Result<(Value, bool), Error> {
        let (kind, nullable) = match obj.get("type") {
            Some(Value::String(kind)) => (kind.as_str(), false),
            Some(Value::Array(kinds)) => {
                let non_null: Vec<&str> = kinds
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|kind| *kind != "null")
                    .collect();
                match non_null.as_slice() {
                    [kind] => (*kind, non_null.len() < kinds.len()),
                    _ => return Err(Error::unsupported("multi-typed field")),
                }
            }
            _ => return Err(Error::unsupported("untyped schema")),
        };

        let mut out = Map::new();
        out.insert("type".to_string(), Value::String(kind.to_string()));

        match kind {
            "string" => {
                if let Some(Value::Array(values)) = obj.get("enum") {
                    let values: Vec<Value> =
                        values.iter().filter(|value| !value.is_null()).cloned().collect();
                    out.insert("enum".to_string(), Value::Array(values));
                }
            }
            "integer" | "number" | "boolean" => {}
            "array" => {
                let items = match obj.get("items") {
                    Some(items @ Value::Object(_)) => items,
                    _ => return Err(Error::unsupported("tuple or untyped array")),
                };
                let (items, _) = self.normalize(items)?;
                out.insert("items".to_string(), items);
            }
            "object" => self.normalize_object(obj, &mut out)?,
            other => return Err(Error::unsupported(format!("type {other}"))),
        }

        Ok((Value::Object(out), nullable))
    }

    fn normalize_object(
        &mut self,
        obj: &Map<String, Value>,
        out: &mut Map<String, Value>,
    ) -> Result<(), Error> {
        let properties = obj.get("properties").and_then(Value::as_object);
        let additional = obj.get("additionalProperties");

        let open_ended = matches!(additional, Some(extra) if extra != &Value::Bool(false));
        if properties.is_none() && open_ended {
            return Err(Error::unsupported("map"));
        }

        let mut props = Map::new();
        let mut nullable_fields = Vec::new();
        for (name, property) in properties.into_iter().flatten() {
            let (schema, nullable) = self.normalize(property)?;
            if nullable {
                nullable_fields.push(name.as_str());
            }
            props.insert(name.clone(), schema);
        }

        let required: Vec<Value> = obj
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|name| props.contains_key(*name) && !nullable_fields.contains(name))
            .map(|name| Value::String(name.to_string()))
            .collect();

        out.insert("properties".to_string(), Value::Object(props));
        if !required.is_empty() {
            out.insert("required".to_string(), Value::Array(required));
        }
        Ok(())
    }
}
